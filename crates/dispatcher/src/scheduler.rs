//! Worker注册表与任务调度器
//!
//! 所有Worker和任务状态都在一把写锁下变更：选择Worker与绑定任务是一个原子步骤，
//! 因此同一个空闲Worker不会被两个并发提交同时占用。持久化和事件广播也在写锁内完成，
//! 存储收到的写入顺序与内存中的变更顺序一致。

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use automation_core::{
    models::{Task, TaskFilter, TaskOutcome, TaskRequest, TaskStatus, Worker, WorkerRegistration,
        WorkerStatus},
    traits::{CapabilityPolicy, ClassificationPolicy, StateStore, TaskDispatchStrategy},
    AutomationError, AutomationResult,
};
use automation_infrastructure::MetricsCollector;

use crate::policies::{DefaultClassificationPolicy, TaskTypeCapabilityPolicy};
use crate::strategies::LeastLoadedStrategy;

const TASK_EVENT_CAPACITY: usize = 256;

/// 提交任务的结果
#[derive(Debug, Clone)]
pub enum Assignment {
    Assigned { task: Task, worker: Worker },
    /// 暂无可用Worker，`position` 为在待处理队列中的位置（从1开始）
    Queued { task: Task, position: usize },
}

impl Assignment {
    pub fn task(&self) -> &Task {
        match self {
            Assignment::Assigned { task, .. } | Assignment::Queued { task, .. } => task,
        }
    }
}

/// Worker池指标
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct WorkerPoolMetrics {
    pub total_workers: usize,
    /// 非离线的Worker数
    pub active_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub offline_workers: usize,
    pub queue_depth: usize,
    pub average_task_duration_ms: f64,
}

/// 任务数量统计
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TaskMetrics {
    pub total: usize,
    pub pending: usize,
    pub assigned: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub queue_depth: usize,
    /// 已结束任务的平均耗时
    pub average_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStatus {
    pub workers: Vec<Worker>,
    pub metrics: WorkerPoolMetrics,
}

#[derive(Default)]
struct SchedulerState {
    workers: HashMap<String, Worker>,
    tasks: HashMap<String, Task>,
    /// 待处理任务ID，按优先级降序、提交时间升序排列
    pending: Vec<String>,
    next_seq: u64,
}

/// 本次变更涉及的记录，用于持久化和广播
#[derive(Default)]
struct Changes {
    workers: Vec<Worker>,
    tasks: Vec<Task>,
}

impl Changes {
    fn assigned(&mut self, (task, worker): (Task, Worker)) {
        self.tasks.push(task);
        self.workers.push(worker);
    }
}

impl SchedulerState {
    /// 插入待处理队列，相同顺序的任务排在已有任务之后，返回从1开始的位置
    fn enqueue(&mut self, task_id: &str) -> usize {
        let Some(task) = self.tasks.get(task_id) else {
            return 0;
        };
        let index = self
            .pending
            .iter()
            .position(|queued| {
                self.tasks
                    .get(queued)
                    .map_or(true, |existing| task.queue_order(existing) == Ordering::Less)
            })
            .unwrap_or(self.pending.len());
        self.pending.insert(index, task_id.to_string());
        index + 1
    }

    fn candidates(&self, task: &Task) -> Vec<&Worker> {
        let mut candidates: Vec<&Worker> = self
            .workers
            .values()
            .filter(|w| w.is_idle() && w.can_handle(&task.required_capabilities))
            .collect();
        candidates.sort_by_key(|w| w.registration_seq);
        candidates
    }

    fn bind(&mut self, task_id: &str, worker_id: &str) -> AutomationResult<(Task, Worker)> {
        let now = Utc::now();
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| AutomationError::UnknownWorker {
                id: worker_id.to_string(),
            })?;
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| AutomationError::TaskNotFound {
                id: task_id.to_string(),
            })?;

        worker.status = WorkerStatus::Busy;
        worker.current_task_id = Some(task.id.clone());
        worker.last_activity = now;

        task.status = TaskStatus::Assigned;
        task.assigned_worker_id = Some(worker.id.clone());
        task.assigned_at = Some(now);

        Ok((task.clone(), worker.clone()))
    }

    fn pool_metrics(&self) -> WorkerPoolMetrics {
        let count = |status: WorkerStatus| self.workers.values().filter(|w| w.status == status).count();
        let (weighted, finished) = self.workers.values().fold((0.0, 0u64), |(sum, n), w| {
            let f = w.performance.finished();
            (sum + w.performance.average_duration_ms * f as f64, n + f)
        });
        let offline = count(WorkerStatus::Offline);

        WorkerPoolMetrics {
            total_workers: self.workers.len(),
            active_workers: self.workers.len() - offline,
            idle_workers: count(WorkerStatus::Idle),
            busy_workers: count(WorkerStatus::Busy),
            offline_workers: offline,
            queue_depth: self.pending.len(),
            average_task_duration_ms: if finished == 0 {
                0.0
            } else {
                weighted / finished as f64
            },
        }
    }
}

/// 任务调度器
pub struct TaskScheduler {
    state: RwLock<SchedulerState>,
    strategy: Arc<dyn TaskDispatchStrategy>,
    capability_policy: Arc<dyn CapabilityPolicy>,
    classification_policy: Arc<dyn ClassificationPolicy>,
    store: Arc<dyn StateStore>,
    task_events: broadcast::Sender<Task>,
    metrics: Arc<MetricsCollector>,
}

impl TaskScheduler {
    pub fn new(store: Arc<dyn StateStore>, metrics: Arc<MetricsCollector>) -> Self {
        let (task_events, _) = broadcast::channel(TASK_EVENT_CAPACITY);
        Self {
            state: RwLock::new(SchedulerState::default()),
            strategy: Arc::new(LeastLoadedStrategy::new()),
            capability_policy: Arc::new(TaskTypeCapabilityPolicy),
            classification_policy: Arc::new(DefaultClassificationPolicy),
            store,
            task_events,
            metrics,
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn TaskDispatchStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_capability_policy(mut self, policy: Arc<dyn CapabilityPolicy>) -> Self {
        self.capability_policy = policy;
        self
    }

    pub fn with_classification_policy(mut self, policy: Arc<dyn ClassificationPolicy>) -> Self {
        self.classification_policy = policy;
        self
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// 注册Worker，注册后立即尝试消化待处理队列
    pub async fn register_worker(&self, registration: WorkerRegistration) -> AutomationResult<Worker> {
        let id = registration.id.trim().to_string();
        if id.is_empty() {
            return Err(AutomationError::missing_field("id"));
        }

        let mut changes = Changes::default();
        let worker = {
            let mut state = self.state.write().await;
            if state.workers.contains_key(&id) {
                return Err(AutomationError::DuplicateWorker { id });
            }
            state.next_seq += 1;
            let seq = state.next_seq;
            let worker = Worker::new(WorkerRegistration { id: id.clone(), ..registration }, seq);
            state.workers.insert(id.clone(), worker.clone());
            self.drain_pending(&mut state, &mut changes).await;
            self.observe(&state);
            let worker = state.workers.get(&id).cloned().unwrap_or(worker);
            changes.workers.push(worker.clone());
            self.publish(changes).await;
            worker
        };

        info!(
            "注册Worker: {} (类型: {}, 能力: {:?})",
            worker.id, worker.worker_type, worker.capabilities
        );
        Ok(worker)
    }

    /// 提交任务：有合适的空闲Worker则立即分配，否则进入待处理队列
    pub async fn assign_task(&self, request: TaskRequest) -> AutomationResult<Assignment> {
        let task_type = request
            .task_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AutomationError::InvalidTask("缺少任务类型".to_string()))?
            .to_string();

        let mut classification = self.classification_policy.classify(&task_type, &request.data);
        if let Some(priority) = request.priority {
            classification.priority = priority;
        }
        if let Some(category) = request.category.filter(|c| !c.trim().is_empty()) {
            classification.category = category;
        }
        let required = self
            .capability_policy
            .required_capabilities(&task_type, &request.data);
        let task = Task::new(task_type, classification, request.data, request.workflow, required);
        self.metrics.record_task_submitted();

        let assignment = {
            let mut state = self.state.write().await;
            state.tasks.insert(task.id.clone(), task.clone());

            let selected = match self.select_worker(&state, &task).await {
                Ok(selected) => selected,
                Err(e) => {
                    state.tasks.remove(&task.id);
                    return Err(e);
                }
            };
            let assignment = match selected {
                Some(worker_id) => {
                    let (task, worker) = state.bind(&task.id, &worker_id)?;
                    Assignment::Assigned { task, worker }
                }
                None => {
                    let position = state.enqueue(&task.id);
                    Assignment::Queued {
                        task: task.clone(),
                        position,
                    }
                }
            };
            self.observe(&state);

            let mut changes = Changes::default();
            match &assignment {
                Assignment::Assigned { task, worker } => {
                    info!("任务 {} ({}) 分配给Worker {}", task.id, task.task_type, worker.id);
                    self.metrics.record_task_assigned();
                    changes.assigned((task.clone(), worker.clone()));
                }
                Assignment::Queued { task, position } => {
                    debug!("任务 {} 暂无可用Worker，进入队列位置 {}", task.id, position);
                    self.metrics.record_task_queued();
                    changes.tasks.push(task.clone());
                }
            }
            self.publish(changes).await;
            assignment
        };

        Ok(assignment)
    }

    /// Worker开始执行已分配的任务
    pub async fn start_task(&self, task_id: &str) -> AutomationResult<Task> {
        let task = {
            let mut state = self.state.write().await;
            let task = state
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| AutomationError::TaskNotFound {
                    id: task_id.to_string(),
                })?;
            if task.status != TaskStatus::Assigned {
                return Err(AutomationError::InvalidTaskState {
                    id: task_id.to_string(),
                    status: task.status.to_string(),
                    operation: "start".to_string(),
                });
            }
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            let task = task.clone();
            self.publish(Changes {
                workers: vec![],
                tasks: vec![task.clone()],
            })
            .await;
            task
        };

        debug!("任务 {} 开始执行", task.id);
        Ok(task)
    }

    /// 上报任务结果，释放Worker并消化待处理队列
    pub async fn complete_task(&self, task_id: &str, outcome: TaskOutcome) -> AutomationResult<Task> {
        let mut changes = Changes::default();
        let completed = {
            let mut state = self.state.write().await;
            let task = state
                .tasks
                .get(task_id)
                .ok_or_else(|| AutomationError::TaskNotFound {
                    id: task_id.to_string(),
                })?;
            if !matches!(task.status, TaskStatus::Assigned | TaskStatus::Running) {
                return Err(AutomationError::InvalidTaskState {
                    id: task_id.to_string(),
                    status: task.status.to_string(),
                    operation: "complete".to_string(),
                });
            }
            let worker_id = task.assigned_worker_id.clone().unwrap_or_default();
            if !state.workers.contains_key(&worker_id) {
                return Err(AutomationError::UnknownWorker { id: worker_id });
            }

            let now = Utc::now();
            let succeeded = outcome.is_success();
            let mut completed = task.clone();
            completed.completed_at = Some(now);
            match outcome {
                TaskOutcome::Succeeded { result } => {
                    completed.status = TaskStatus::Completed;
                    completed.result = Some(result);
                }
                TaskOutcome::Failed { error } => {
                    completed.status = TaskStatus::Failed;
                    completed.error = Some(error);
                }
            }
            let duration_ms = completed.duration_ms().unwrap_or(0.0);
            state.tasks.insert(completed.id.clone(), completed.clone());

            if let Some(worker) = state.workers.get_mut(&worker_id) {
                worker.performance.record(succeeded, duration_ms);
                worker.current_task_id = None;
                worker.last_activity = now;
                if worker.status != WorkerStatus::Offline {
                    worker.status = WorkerStatus::Idle;
                }
                changes.workers.push(worker.clone());
            }
            self.metrics
                .record_task_finished(&completed.task_type, succeeded, duration_ms);

            self.drain_pending(&mut state, &mut changes).await;
            self.observe(&state);
            changes.tasks.insert(0, completed.clone());
            self.publish(changes).await;
            completed
        };

        info!(
            "任务 {} 执行结束: {} (Worker: {})",
            completed.id,
            completed.status,
            completed.assigned_worker_id.as_deref().unwrap_or("-")
        );
        Ok(completed)
    }

    /// 将Worker标记为离线，其正在处理的任务重新排队
    pub async fn set_worker_offline(&self, worker_id: &str) -> AutomationResult<Worker> {
        let mut changes = Changes::default();
        let worker = {
            let mut state = self.state.write().await;
            let worker = state
                .workers
                .get_mut(worker_id)
                .ok_or_else(|| AutomationError::UnknownWorker {
                    id: worker_id.to_string(),
                })?;
            worker.status = WorkerStatus::Offline;
            worker.last_activity = Utc::now();
            let orphaned = worker.current_task_id.take();
            let worker = worker.clone();

            if let Some(task_id) = orphaned {
                if let Some(task) = state.tasks.get_mut(&task_id) {
                    warn!("Worker {} 离线，任务 {} 重新排队", worker_id, task_id);
                    task.status = TaskStatus::Pending;
                    task.assigned_worker_id = None;
                    task.assigned_at = None;
                    task.started_at = None;
                    task.retry_count += 1;
                    changes.tasks.push(task.clone());
                    state.enqueue(&task_id);
                }
            }
            self.drain_pending(&mut state, &mut changes).await;
            self.observe(&state);
            changes.workers.push(worker.clone());
            self.publish(changes).await;
            worker
        };

        info!("Worker {} 已离线", worker.id);
        Ok(worker)
    }

    /// 离线Worker恢复上线
    pub async fn set_worker_online(&self, worker_id: &str) -> AutomationResult<Worker> {
        let mut changes = Changes::default();
        let worker = {
            let mut state = self.state.write().await;
            let worker = state
                .workers
                .get_mut(worker_id)
                .ok_or_else(|| AutomationError::UnknownWorker {
                    id: worker_id.to_string(),
                })?;
            if worker.status == WorkerStatus::Offline {
                worker.status = WorkerStatus::Idle;
                worker.last_activity = Utc::now();
            }
            self.drain_pending(&mut state, &mut changes).await;
            self.observe(&state);
            let worker = state
                .workers
                .get(worker_id)
                .cloned()
                .ok_or_else(|| AutomationError::UnknownWorker {
                    id: worker_id.to_string(),
                })?;
            changes.workers.push(worker.clone());
            self.publish(changes).await;
            worker
        };

        info!("Worker {} 已上线", worker.id);
        Ok(worker)
    }

    /// 等待任务进入终态
    pub async fn wait_for_task(&self, task_id: &str, timeout: Duration) -> AutomationResult<Task> {
        // 先订阅再读状态，避免错过中间完成的事件
        let mut events = self.task_events.subscribe();
        if let Some(task) = self.terminal_task(task_id).await? {
            return Ok(task);
        }

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(task) if task.id == task_id && task.status.is_terminal() => {
                        return Ok(task);
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("任务事件订阅落后 {} 条，重新读取状态", skipped);
                        if let Some(task) = self.terminal_task(task_id).await? {
                            return Ok(task);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(AutomationError::Internal("任务事件通道已关闭".to_string()));
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| AutomationError::TaskTimeout {
                id: task_id.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    async fn terminal_task(&self, task_id: &str) -> AutomationResult<Option<Task>> {
        let state = self.state.read().await;
        let task = state
            .tasks
            .get(task_id)
            .ok_or_else(|| AutomationError::TaskNotFound {
                id: task_id.to_string(),
            })?;
        Ok(task.status.is_terminal().then(|| task.clone()))
    }

    pub async fn get_task(&self, task_id: &str) -> AutomationResult<Task> {
        self.state
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| AutomationError::TaskNotFound {
                id: task_id.to_string(),
            })
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// 待处理队列中的任务，按出队顺序
    pub async fn pending_tasks(&self) -> Vec<Task> {
        let state = self.state.read().await;
        state
            .pending
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect()
    }

    pub async fn get_worker(&self, worker_id: &str) -> AutomationResult<Worker> {
        self.state
            .read()
            .await
            .workers
            .get(worker_id)
            .cloned()
            .ok_or_else(|| AutomationError::UnknownWorker {
                id: worker_id.to_string(),
            })
    }

    pub async fn list_workers(&self) -> Vec<Worker> {
        let state = self.state.read().await;
        let mut workers: Vec<Worker> = state.workers.values().cloned().collect();
        workers.sort_by_key(|w| w.registration_seq);
        workers
    }

    pub async fn pool_metrics(&self) -> WorkerPoolMetrics {
        self.state.read().await.pool_metrics()
    }

    pub async fn task_metrics(&self) -> TaskMetrics {
        let state = self.state.read().await;
        let mut metrics = TaskMetrics {
            total: state.tasks.len(),
            queue_depth: state.pending.len(),
            ..Default::default()
        };
        let mut duration_total = 0.0;
        let mut timed = 0usize;
        for task in state.tasks.values() {
            if let Some(ms) = task.duration_ms() {
                duration_total += ms;
                timed += 1;
            }
            match task.status {
                TaskStatus::Pending => metrics.pending += 1,
                TaskStatus::Assigned => metrics.assigned += 1,
                TaskStatus::Running => metrics.running += 1,
                TaskStatus::Completed => metrics.completed += 1,
                TaskStatus::Failed => metrics.failed += 1,
            }
        }
        if timed > 0 {
            metrics.average_duration_ms = duration_total / timed as f64;
        }
        metrics
    }

    /// Worker列表及池指标，在同一把读锁下生成
    pub async fn get_system_status(&self) -> WorkerPoolStatus {
        let state = self.state.read().await;
        let mut workers: Vec<Worker> = state.workers.values().cloned().collect();
        workers.sort_by_key(|w| w.registration_seq);
        WorkerPoolStatus {
            workers,
            metrics: state.pool_metrics(),
        }
    }

    /// 从持久化快照恢复Worker和任务
    pub async fn restore(&self, workers: Vec<Worker>, tasks: Vec<Task>) {
        let mut changes = Changes::default();
        {
            let mut state = self.state.write().await;
            state.next_seq = workers
                .iter()
                .map(|w| w.registration_seq)
                .max()
                .unwrap_or(0)
                .max(state.next_seq);
            state.workers.extend(workers.into_iter().map(|w| (w.id.clone(), w)));

            let mut pending: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending)
                .collect();
            pending.sort_by(|a, b| a.queue_order(b));
            let pending_ids: Vec<String> = pending.iter().map(|t| t.id.clone()).collect();
            state.tasks.extend(tasks.into_iter().map(|t| (t.id.clone(), t)));
            state.pending.extend(pending_ids);

            info!(
                "恢复调度状态: {} 个Worker, {} 个任务, {} 个待处理",
                state.workers.len(),
                state.tasks.len(),
                state.pending.len()
            );
            self.drain_pending(&mut state, &mut changes).await;
            self.observe(&state);
            self.publish(changes).await;
        }
    }

    async fn select_worker(
        &self,
        state: &SchedulerState,
        task: &Task,
    ) -> AutomationResult<Option<String>> {
        let candidates = state.candidates(task);
        if candidates.is_empty() {
            return Ok(None);
        }
        let selected = self.strategy.select_worker(task, &candidates).await?;
        Ok(selected.filter(|id| candidates.iter().any(|w| &w.id == id)))
    }

    /// 按队列顺序扫描一遍，为能满足的任务分配空闲Worker
    async fn drain_pending(&self, state: &mut SchedulerState, changes: &mut Changes) {
        let mut index = 0;
        while index < state.pending.len() {
            if !state.workers.values().any(Worker::is_idle) {
                break;
            }
            let task_id = state.pending[index].clone();
            let Some(task) = state.tasks.get(&task_id).cloned() else {
                state.pending.remove(index);
                continue;
            };

            match self.select_worker(state, &task).await {
                Ok(Some(worker_id)) => match state.bind(&task_id, &worker_id) {
                    Ok(bound) => {
                        state.pending.remove(index);
                        info!("队列中的任务 {} 分配给Worker {}", task_id, worker_id);
                        self.metrics.record_task_assigned();
                        changes.assigned(bound);
                    }
                    Err(e) => {
                        warn!("绑定任务 {} 失败: {}", task_id, e);
                        index += 1;
                    }
                },
                Ok(None) => index += 1,
                Err(e) => {
                    warn!("分派策略 {} 出错，停止消化队列: {}", self.strategy.name(), e);
                    break;
                }
            }
        }
    }

    fn observe(&self, state: &SchedulerState) {
        self.metrics.set_queue_depth(state.pending.len());
        self.metrics
            .set_idle_workers(state.workers.values().filter(|w| w.is_idle()).count());
    }

    /// 持久化并广播变更，调用方持有状态写锁；存储失败只记录日志
    async fn publish(&self, changes: Changes) {
        for worker in &changes.workers {
            if let Err(e) = self.store.save_worker(worker).await {
                warn!("持久化Worker {} 失败 ({}): {}", worker.id, self.store.name(), e);
            }
        }
        for task in changes.tasks {
            if let Err(e) = self.store.save_task(&task).await {
                warn!("持久化任务 {} 失败 ({}): {}", task.id, self.store.name(), e);
            }
            let _ = self.task_events.send(task);
        }
    }
}
