use std::sync::Arc;
use std::time::Duration;

use automation_core::models::{
    ActionPlanTemplate, PlanFilter, PlanStatus, StepDefinition, StepStatus, TaskFilter,
    TaskOutcome, TaskPriority, WorkerRegistration,
};
use automation_core::AutomationError;
use automation_dispatcher::test_utils::{test_engine, test_scheduler, ScriptedStepExecutor};
use automation_dispatcher::{ActionPlanEngine, EngineConfig, TemplateRegistry};
use automation_infrastructure::{InMemoryStore, MetricsCollector};
use serde_json::json;

async fn complete_prerequisites(engine: &ActionPlanEngine) {
    for template_id in ["system-check", "security-audit"] {
        let plan = engine
            .create_action_plan(template_id, json!({}))
            .await
            .unwrap();
        let result = engine.execute_action_plan(&plan.id).await.unwrap();
        assert!(result.success, "{} 应当执行成功", template_id);
    }
}

#[tokio::test]
async fn test_failed_step_then_retry_resumes_at_failed_step() {
    let executor = Arc::new(ScriptedStepExecutor::new().fail_step("deploy_new_version", 3));
    let engine = test_engine(test_scheduler(), executor.clone(), EngineConfig::default());
    complete_prerequisites(&engine).await;

    let plan = engine
        .create_action_plan("deploy-template", json!({"version": "2.1.0"}))
        .await
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Created);

    let result = engine.execute_action_plan(&plan.id).await.unwrap();
    assert!(!result.success);
    let failed = result.plan;
    assert_eq!(failed.status, PlanStatus::Failed);
    assert_eq!(failed.steps[0].status, StepStatus::Completed);
    assert!(failed.steps[0].output.is_some());
    assert_eq!(failed.steps[1].status, StepStatus::Failed);
    assert_eq!(failed.steps[1].attempts, 3);
    assert_eq!(failed.steps[2].status, StepStatus::Pending);
    assert_eq!(failed.progress, 25);
    assert_eq!(failed.error, failed.steps[1].error);
    assert!(failed.error.unwrap().contains("deploy_new_version"));

    let retried = engine.retry_action_plan(&plan.id).await.unwrap();
    assert!(retried.success);
    assert_eq!(retried.plan.status, PlanStatus::Completed);
    assert_eq!(retried.plan.retry_count, 1);
    assert_eq!(retried.plan.progress, 100);
    assert!(retried.plan.completed_at.is_some());

    // 重试从失败的步骤开始，已完成的备份步骤不会再执行
    let backups = executor
        .executed()
        .iter()
        .filter(|s| s.as_str() == "backup_current_version")
        .count();
    assert_eq!(backups, 1);
    assert_eq!(retried.plan.steps[1].attempts, 4);
}

#[tokio::test]
async fn test_in_run_retry_recovers_step() {
    let executor = Arc::new(ScriptedStepExecutor::new().fail_step("check_server_health", 1));
    let engine = test_engine(test_scheduler(), executor, EngineConfig::default());

    let plan = engine
        .create_action_plan("system-check", json!({}))
        .await
        .unwrap();
    let result = engine.execute_action_plan(&plan.id).await.unwrap();
    assert!(result.success);
    assert_eq!(result.plan.steps[0].attempts, 2);
}

#[tokio::test]
async fn test_unmet_dependency_keeps_plan_created() {
    let engine = test_engine(
        test_scheduler(),
        Arc::new(ScriptedStepExecutor::new()),
        EngineConfig::default(),
    );
    let plan = engine
        .create_action_plan("deploy-template", json!({}))
        .await
        .unwrap();

    let result = engine.execute_action_plan(&plan.id).await.unwrap();
    assert!(!result.success);
    assert!(result.message.contains("system-check"));
    let waiting = engine.get_action_plan(&plan.id).await.unwrap();
    assert_eq!(waiting.status, PlanStatus::Created);
    assert!(waiting.deferred);

    // 依赖仍未完成，扫描不会执行
    assert!(engine.run_deferred_plans().await.is_empty());
    assert_eq!(
        engine.get_action_plan(&plan.id).await.unwrap().status,
        PlanStatus::Created
    );
}

#[tokio::test]
async fn test_deferred_plans_run_by_priority_after_dependencies_complete() {
    let executor = Arc::new(ScriptedStepExecutor::new());
    let engine = test_engine(test_scheduler(), executor.clone(), EngineConfig::default());

    let optimization = engine
        .create_action_plan("performance-optimization", json!({}))
        .await
        .unwrap();
    let audit = engine
        .create_action_plan("security-audit", json!({}))
        .await
        .unwrap();
    let untouched = engine
        .create_action_plan("performance-optimization", json!({}))
        .await
        .unwrap();
    for plan_id in [&optimization.id, &audit.id] {
        assert!(!engine.execute_action_plan(plan_id).await.unwrap().success);
    }

    let check = engine
        .create_action_plan("system-check", json!({}))
        .await
        .unwrap();
    assert!(engine.execute_action_plan(&check.id).await.unwrap().success);

    let results = engine.run_deferred_plans().await;
    let order: Vec<&str> = results.iter().map(|r| r.plan.id.as_str()).collect();
    assert_eq!(order, vec![audit.id.as_str(), optimization.id.as_str()]);
    for result in &results {
        assert!(result.success);
        assert_eq!(result.plan.status, PlanStatus::Completed);
        assert!(!result.plan.deferred);
    }
    assert!(executor.executed().starts_with(&[
        "check_server_health".to_string(),
        "check_database_connection".to_string(),
        "check_disk_space".to_string(),
        "check_memory_usage".to_string(),
        "vulnerability_scan".to_string(),
    ]));

    // 只执行曾请求过执行的计划
    let untouched = engine.get_action_plan(&untouched.id).await.unwrap();
    assert_eq!(untouched.status, PlanStatus::Created);
    assert!(!untouched.deferred);
    assert!(engine.run_deferred_plans().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_background_sweep_executes_waiting_plan() {
    let engine = test_engine(
        test_scheduler(),
        Arc::new(ScriptedStepExecutor::new()),
        EngineConfig {
            deferred_sweep_interval: Duration::from_secs(1),
            ..EngineConfig::default()
        },
    );
    let deploy = engine
        .create_action_plan("deploy-template", json!({"version": "3.0.0"}))
        .await
        .unwrap();
    engine.execute_action_plan(&deploy.id).await.unwrap();
    complete_prerequisites(&engine).await;

    engine.start_deferred_sweep().await;
    engine.start_deferred_sweep().await;

    let mut waited = Duration::ZERO;
    let completed = loop {
        let plan = engine.get_action_plan(&deploy.id).await.unwrap();
        if plan.status == PlanStatus::Completed {
            break plan;
        }
        assert!(waited < Duration::from_secs(10), "等待中的计划没有被扫描执行");
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    };
    assert!(!completed.deferred);
    assert_eq!(completed.progress, 100);

    engine.shutdown().await;
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stopped_sweep_leaves_plan_waiting() {
    let engine = test_engine(
        test_scheduler(),
        Arc::new(ScriptedStepExecutor::new()),
        EngineConfig {
            deferred_sweep_interval: Duration::from_secs(1),
            ..EngineConfig::default()
        },
    );
    let deploy = engine
        .create_action_plan("deploy-template", json!({}))
        .await
        .unwrap();
    engine.execute_action_plan(&deploy.id).await.unwrap();

    engine.start_deferred_sweep().await;
    engine.shutdown().await;
    complete_prerequisites(&engine).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let plan = engine.get_action_plan(&deploy.id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Created);
    assert!(plan.deferred);
}

#[tokio::test]
async fn test_retry_limit_exceeded() {
    let executor = Arc::new(ScriptedStepExecutor::new().fail_step("check_disk_space", 100));
    let engine = test_engine(
        test_scheduler(),
        executor,
        EngineConfig {
            max_retries: 1,
            execution_timeout: Duration::from_secs(60),
            ..EngineConfig::default()
        },
    );
    let plan = engine
        .create_action_plan("system-check", json!({}))
        .await
        .unwrap();

    assert!(!engine.execute_action_plan(&plan.id).await.unwrap().success);
    assert!(!engine.retry_action_plan(&plan.id).await.unwrap().success);

    let exhausted = engine.retry_action_plan(&plan.id).await;
    assert!(matches!(
        exhausted,
        Err(AutomationError::RetryLimitExceeded { max: 1, .. })
    ));
    let plan = engine.get_action_plan(&plan.id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Failed);
    assert_eq!(plan.retry_count, 2);
}

#[tokio::test]
async fn test_invalid_plan_states() {
    let engine = test_engine(
        test_scheduler(),
        Arc::new(ScriptedStepExecutor::new()),
        EngineConfig::default(),
    );
    let plan = engine
        .create_action_plan("system-check", json!({}))
        .await
        .unwrap();

    assert!(matches!(
        engine.retry_action_plan(&plan.id).await,
        Err(AutomationError::InvalidPlanState { .. })
    ));
    engine.execute_action_plan(&plan.id).await.unwrap();
    assert!(matches!(
        engine.execute_action_plan(&plan.id).await,
        Err(AutomationError::InvalidPlanState { .. })
    ));
    assert!(matches!(
        engine.create_action_plan("unknown", json!({})).await,
        Err(AutomationError::TemplateNotFound { .. })
    ));
    assert!(matches!(
        engine.execute_action_plan("missing").await,
        Err(AutomationError::PlanNotFound { .. })
    ));
}

fn engine_with_template(
    scheduler: Arc<automation_dispatcher::TaskScheduler>,
    template: ActionPlanTemplate,
) -> Arc<ActionPlanEngine> {
    let mut templates = TemplateRegistry::new();
    templates.register(template).unwrap();
    Arc::new(ActionPlanEngine::new(
        templates,
        scheduler,
        Arc::new(ScriptedStepExecutor::new()),
        Arc::new(InMemoryStore::new()),
        EngineConfig::default(),
        Arc::new(MetricsCollector::new()),
    ))
}

#[tokio::test]
async fn test_task_step_dispatched_through_scheduler() {
    let scheduler = test_scheduler();
    scheduler
        .register_worker(WorkerRegistration::new("renderer", &["render"]))
        .await
        .unwrap();
    let engine = engine_with_template(
        Arc::clone(&scheduler),
        ActionPlanTemplate {
            id: "render-job".to_string(),
            name: "渲染".to_string(),
            category: "media".to_string(),
            priority: TaskPriority::High,
            dependencies: vec![],
            steps: vec![StepDefinition::task("render", "渲染视频", "render")
                .with_parameters(json!({"file": "{{file}}"}))],
        },
    );
    let plan = engine
        .create_action_plan("render-job", json!({"file": "intro.mp4"}))
        .await
        .unwrap();

    let execution = tokio::spawn({
        let engine = Arc::clone(&engine);
        let plan_id = plan.id.clone();
        async move { engine.execute_action_plan(&plan_id).await }
    });

    let filter = TaskFilter {
        worker_id: Some("renderer".to_string()),
        ..Default::default()
    };
    let task = loop {
        if let Some(task) = scheduler.list_tasks(&filter).await.into_iter().next() {
            break task;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(task.data["parameters"]["file"], json!("intro.mp4"));
    assert_eq!(task.workflow.as_deref(), Some(plan.id.as_str()));

    scheduler
        .complete_task(&task.id, TaskOutcome::success(json!({"frames": 240})))
        .await
        .unwrap();

    let result = execution.await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.plan.steps[0].task_id.as_deref(), Some(task.id.as_str()));
    assert_eq!(result.plan.steps[0].output, Some(json!({"frames": 240})));
}

#[tokio::test(start_paused = true)]
async fn test_task_step_without_worker_times_out() {
    let scheduler = test_scheduler();
    let engine = engine_with_template(
        Arc::clone(&scheduler),
        ActionPlanTemplate {
            id: "gpu-job".to_string(),
            name: "GPU任务".to_string(),
            category: "general".to_string(),
            priority: TaskPriority::Medium,
            dependencies: vec![],
            steps: vec![StepDefinition::task("train", "训练", "gpu").with_timeout_seconds(5)],
        },
    );
    let plan = engine
        .create_action_plan("gpu-job", json!({}))
        .await
        .unwrap();

    let result = engine.execute_action_plan(&plan.id).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("超时"));

    let failed = engine
        .get_action_plans(&PlanFilter {
            status: Some(PlanStatus::Failed),
            ..Default::default()
        })
        .await;
    assert_eq!(failed.len(), 1);
}
