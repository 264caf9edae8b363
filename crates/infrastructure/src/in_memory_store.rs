use std::collections::BTreeMap;

use async_trait::async_trait;
use automation_core::{
    models::{ActionPlan, HealthCheck, Incident, StateSnapshot, Task, Worker},
    traits::StateStore,
    AutomationResult,
};
use tokio::sync::RwLock;

/// 按实体ID索引的状态表，内存存储与文件存储共用
#[derive(Debug, Default, Clone)]
pub(crate) struct StateTables {
    pub workers: BTreeMap<String, Worker>,
    pub tasks: BTreeMap<String, Task>,
    pub plans: BTreeMap<String, ActionPlan>,
    pub health_checks: BTreeMap<String, HealthCheck>,
    pub incidents: BTreeMap<String, Incident>,
}

impl StateTables {
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            workers: snapshot
                .workers
                .into_iter()
                .map(|w| (w.id.clone(), w))
                .collect(),
            tasks: snapshot
                .tasks
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            plans: snapshot
                .plans
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            health_checks: snapshot
                .health_checks
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            incidents: snapshot
                .incidents
                .into_iter()
                .map(|i| (i.id.clone(), i))
                .collect(),
        }
    }

    pub fn to_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            workers: self.workers.values().cloned().collect(),
            tasks: self.tasks.values().cloned().collect(),
            plans: self.plans.values().cloned().collect(),
            health_checks: self.health_checks.values().cloned().collect(),
            incidents: self.incidents.values().cloned().collect(),
        }
    }
}

/// 内存状态存储
///
/// 进程退出后数据丢失，适用于测试和不需要持久化的部署。
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<StateTables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已有快照初始化
    pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            tables: RwLock::new(StateTables::from_snapshot(snapshot)),
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn save_worker(&self, worker: &Worker) -> AutomationResult<()> {
        self.tables
            .write()
            .await
            .workers
            .insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn save_task(&self, task: &Task) -> AutomationResult<()> {
        self.tables
            .write()
            .await
            .tasks
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn save_plan(&self, plan: &ActionPlan) -> AutomationResult<()> {
        self.tables
            .write()
            .await
            .plans
            .insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn save_health_check(&self, check: &HealthCheck) -> AutomationResult<()> {
        self.tables
            .write()
            .await
            .health_checks
            .insert(check.id.clone(), check.clone());
        Ok(())
    }

    async fn remove_health_check(&self, id: &str) -> AutomationResult<()> {
        self.tables.write().await.health_checks.remove(id);
        Ok(())
    }

    async fn save_incident(&self, incident: &Incident) -> AutomationResult<()> {
        self.tables
            .write()
            .await
            .incidents
            .insert(incident.id.clone(), incident.clone());
        Ok(())
    }

    async fn load_snapshot(&self) -> AutomationResult<StateSnapshot> {
        Ok(self.tables.read().await.to_snapshot())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automation_core::models::{HealthCheckDefaults, HealthCheckRegistration, WorkerRegistration};

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryStore::new();
        let worker = Worker::new(WorkerRegistration::new("w1", &["build"]), 1);
        store.save_worker(&worker).await.unwrap();
        store.save_worker(&worker).await.unwrap();

        let check = HealthCheck::from_registration(
            HealthCheckRegistration::new("db", "数据库", "database"),
            &HealthCheckDefaults::default(),
        )
        .unwrap();
        store.save_health_check(&check).await.unwrap();

        let snapshot = store.load_snapshot().await.unwrap();
        assert_eq!(snapshot.workers.len(), 1);
        assert_eq!(snapshot.health_checks.len(), 1);

        store.remove_health_check("db").await.unwrap();
        let snapshot = store.load_snapshot().await.unwrap();
        assert!(snapshot.health_checks.is_empty());
    }
}
