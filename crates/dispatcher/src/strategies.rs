use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use automation_core::{
    models::{Task, Worker},
    traits::TaskDispatchStrategy,
    AutomationError, AutomationResult,
};

/// 最少负载策略：已结束+运行中任务数最少者优先，相同时取最早注册者
pub struct LeastLoadedStrategy;

pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

/// Worker类型与任务类型一致者优先，其余按最少负载
pub struct WorkerTypeAffinityStrategy;

fn least_loaded<'a>(candidates: &[&'a Worker]) -> Option<&'a Worker> {
    candidates
        .iter()
        .copied()
        .min_by_key(|worker| (worker.load(), worker.registration_seq))
}

impl LeastLoadedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastLoadedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskDispatchStrategy for LeastLoadedStrategy {
    async fn select_worker(
        &self,
        task: &Task,
        candidates: &[&Worker],
    ) -> AutomationResult<Option<String>> {
        let Some(selected) = least_loaded(candidates) else {
            debug!("没有可处理任务类型 {} 的空闲Worker", task.task_type);
            return Ok(None);
        };

        debug!(
            "最少负载策略选择Worker: {} (负载: {}, 注册序号: {})",
            selected.id,
            selected.load(),
            selected.registration_seq
        );

        Ok(Some(selected.id.clone()))
    }

    fn name(&self) -> &str {
        "LeastLoaded"
    }
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskDispatchStrategy for RoundRobinStrategy {
    async fn select_worker(
        &self,
        task: &Task,
        candidates: &[&Worker],
    ) -> AutomationResult<Option<String>> {
        if candidates.is_empty() {
            debug!("没有可处理任务类型 {} 的空闲Worker", task.task_type);
            return Ok(None);
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        let selected = candidates[index];

        debug!(
            "轮询策略选择Worker: {} (索引: {}/{})",
            selected.id,
            index,
            candidates.len()
        );

        Ok(Some(selected.id.clone()))
    }

    fn name(&self) -> &str {
        "RoundRobin"
    }
}

impl WorkerTypeAffinityStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WorkerTypeAffinityStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskDispatchStrategy for WorkerTypeAffinityStrategy {
    async fn select_worker(
        &self,
        task: &Task,
        candidates: &[&Worker],
    ) -> AutomationResult<Option<String>> {
        let specialized: Vec<&Worker> = candidates
            .iter()
            .copied()
            .filter(|worker| worker.worker_type == task.task_type)
            .collect();

        let selected = if specialized.is_empty() {
            least_loaded(candidates)
        } else {
            debug!("找到类型为 {} 的专用Worker", task.task_type);
            least_loaded(&specialized)
        };

        Ok(selected.map(|worker| {
            debug!(
                "类型亲和策略选择Worker: {} (类型: {})",
                worker.id, worker.worker_type
            );
            worker.id.clone()
        }))
    }

    fn name(&self) -> &str {
        "WorkerTypeAffinity"
    }
}

/// 根据配置名称创建分派策略
pub fn create_strategy(name: &str) -> AutomationResult<Arc<dyn TaskDispatchStrategy>> {
    match name {
        "least_loaded" => Ok(Arc::new(LeastLoadedStrategy::new())),
        "round_robin" => Ok(Arc::new(RoundRobinStrategy::new())),
        "type_affinity" => Ok(Arc::new(WorkerTypeAffinityStrategy::new())),
        other => Err(AutomationError::Configuration(format!(
            "未知的调度策略: {other}"
        ))),
    }
}
