use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::{
    models::{Classification, Task, Worker},
    AutomationResult,
};

/// 任务分派策略接口
///
/// 调用方已经按空闲状态和能力集合筛选过候选Worker，
/// 策略只负责在候选中做选择。调用时持有调度器写锁，实现不应阻塞。
#[async_trait]
pub trait TaskDispatchStrategy: Send + Sync {
    /// 选择Worker，返回Worker ID
    async fn select_worker(
        &self,
        task: &Task,
        candidates: &[&Worker],
    ) -> AutomationResult<Option<String>>;

    /// 策略名称
    fn name(&self) -> &str;
}

/// 能力需求策略：根据任务推导所需能力集合
pub trait CapabilityPolicy: Send + Sync {
    fn required_capabilities(&self, task_type: &str, data: &serde_json::Value)
        -> BTreeSet<String>;

    fn name(&self) -> &str;
}

/// 优先级/分类策略：调用方未显式给出时决定任务的优先级与分类
pub trait ClassificationPolicy: Send + Sync {
    fn classify(&self, task_type: &str, data: &serde_json::Value) -> Classification;

    fn name(&self) -> &str;
}
