#[cfg(test)]
mod strategies_tests {
    use crate::strategies::*;
    use crate::test_utils::{create_test_task, create_test_worker};
    use automation_core::traits::TaskDispatchStrategy;

    #[tokio::test]
    async fn test_least_loaded_prefers_fewest_tasks() {
        let strategy = LeastLoadedStrategy::new();
        let task = create_test_task("build");

        let busy_history = create_test_worker("w1", &["build"], 5, 1);
        let fresh = create_test_worker("w2", &["build"], 1, 2);
        let candidates = vec![&busy_history, &fresh];

        let selected = strategy.select_worker(&task, &candidates).await.unwrap();
        assert_eq!(selected, Some("w2".to_string()));
    }

    #[tokio::test]
    async fn test_least_loaded_tie_breaks_by_registration() {
        let strategy = LeastLoadedStrategy::new();
        let task = create_test_task("build");

        let later = create_test_worker("late", &["build"], 2, 9);
        let earlier = create_test_worker("early", &["build"], 2, 3);
        let candidates = vec![&later, &earlier];

        let selected = strategy.select_worker(&task, &candidates).await.unwrap();
        assert_eq!(selected, Some("early".to_string()));
    }

    #[tokio::test]
    async fn test_round_robin_strategy() {
        let strategy = RoundRobinStrategy::new();
        let task = create_test_task("shell");

        let workers = [
            create_test_worker("worker1", &["shell"], 0, 1),
            create_test_worker("worker2", &["shell"], 1, 2),
            create_test_worker("worker3", &["shell"], 2, 3),
        ];
        let candidates: Vec<_> = workers.iter().collect();

        // 测试轮询选择
        let selected1 = strategy.select_worker(&task, &candidates).await.unwrap();
        let selected2 = strategy.select_worker(&task, &candidates).await.unwrap();
        let selected3 = strategy.select_worker(&task, &candidates).await.unwrap();
        let selected4 = strategy.select_worker(&task, &candidates).await.unwrap();

        assert_eq!(selected1, Some("worker1".to_string()));
        assert_eq!(selected2, Some("worker2".to_string()));
        assert_eq!(selected3, Some("worker3".to_string()));
        assert_eq!(selected4, Some("worker1".to_string()));
    }

    #[tokio::test]
    async fn test_type_affinity_prefers_matching_worker_type() {
        let strategy = WorkerTypeAffinityStrategy::new();
        let task = create_test_task("deploy");

        let generic = create_test_worker("generic", &["deploy"], 0, 1);
        let mut specialist = create_test_worker("specialist", &["deploy"], 4, 2);
        specialist.worker_type = "deploy".to_string();
        let candidates = vec![&generic, &specialist];

        let selected = strategy.select_worker(&task, &candidates).await.unwrap();
        assert_eq!(selected, Some("specialist".to_string()));
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let task = create_test_task("build");
        for name in ["least_loaded", "round_robin", "type_affinity"] {
            let strategy = create_strategy(name).unwrap();
            assert_eq!(strategy.select_worker(&task, &[]).await.unwrap(), None);
        }
        assert!(create_strategy("random").is_err());
    }
}
