use async_trait::async_trait;

use crate::{
    models::{ActionPlan, HealthCheck, Incident, StateSnapshot, Task, Worker},
    AutomationResult,
};

/// 状态存储端口
///
/// 组件在持有内存写锁时调用，写入顺序与状态变更顺序一致；实现只需保证单条记录的写入是原子的。
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_worker(&self, worker: &Worker) -> AutomationResult<()>;

    async fn save_task(&self, task: &Task) -> AutomationResult<()>;

    async fn save_plan(&self, plan: &ActionPlan) -> AutomationResult<()>;

    async fn save_health_check(&self, check: &HealthCheck) -> AutomationResult<()>;

    async fn remove_health_check(&self, id: &str) -> AutomationResult<()>;

    async fn save_incident(&self, incident: &Incident) -> AutomationResult<()>;

    /// 读取全部已持久化的状态
    async fn load_snapshot(&self) -> AutomationResult<StateSnapshot>;

    fn name(&self) -> &str;
}
