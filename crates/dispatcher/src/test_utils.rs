//! 测试用的手写模拟实现与构造函数

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use automation_core::{
    models::{
        ActionPlan, Classification, HealthCheck, Incident, StateSnapshot, Task, TaskPriority,
        TaskStatus, Worker, WorkerRegistration,
    },
    traits::{
        HealthProbe, RemediationHook, RemediationOutcome, StateStore, StepContext, StepExecutor,
    },
    AutomationResult,
};
use automation_infrastructure::{DefaultProbeFactory, InMemoryStore, MetricsCollector};

use crate::action_plan::{ActionPlanEngine, EngineConfig};
use crate::health_monitor::{HealthMonitor, MonitorConfig};
use crate::incident::IncidentManager;
use crate::scheduler::TaskScheduler;
use crate::templates::TemplateRegistry;

/// 创建测试Worker，`finished` 为已完成的任务数
pub fn create_test_worker(id: &str, capabilities: &[&str], finished: u64, seq: u64) -> Worker {
    let mut worker = Worker::new(WorkerRegistration::new(id, capabilities), seq);
    worker.performance.tasks_completed = finished;
    worker
}

pub fn create_test_task(task_type: &str) -> Task {
    Task::new(
        task_type.to_string(),
        Classification {
            priority: TaskPriority::Medium,
            category: "general".to_string(),
        },
        Value::Null,
        None,
        BTreeSet::from([task_type.to_string()]),
    )
}

pub fn test_scheduler() -> Arc<TaskScheduler> {
    Arc::new(TaskScheduler::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(MetricsCollector::new()),
    ))
}

pub fn test_engine(
    scheduler: Arc<TaskScheduler>,
    executor: Arc<dyn StepExecutor>,
    config: EngineConfig,
) -> Arc<ActionPlanEngine> {
    let templates = TemplateRegistry::with_builtin().unwrap_or_default();
    Arc::new(ActionPlanEngine::new(
        templates,
        scheduler,
        executor,
        Arc::new(InMemoryStore::new()),
        config,
        Arc::new(MetricsCollector::new()),
    ))
}

pub fn test_monitor(incidents: Arc<IncidentManager>, config: MonitorConfig) -> Arc<HealthMonitor> {
    Arc::new(HealthMonitor::new(
        incidents,
        Arc::new(DefaultProbeFactory::new()),
        Arc::new(InMemoryStore::new()),
        config,
        Arc::new(MetricsCollector::new()),
    ))
}

pub fn test_incidents() -> IncidentManager {
    IncidentManager::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(MetricsCollector::new()),
    )
}

/// 结果可切换的探针
pub struct ScriptedProbe {
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(healthy),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("模拟故障"))
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// 超过检查超时才返回的探针
pub struct SlowProbe {
    pub delay: Duration,
}

#[async_trait]
impl HealthProbe for SlowProbe {
    async fn check(&self) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("slow({}ms)", self.delay.as_millis())
    }
}

/// 按步骤ID注入失败次数的执行器，并记录执行顺序
#[derive(Default)]
pub struct ScriptedStepExecutor {
    failures: HashMap<String, AtomicU32>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedStepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让指定步骤在接下来的 `times` 次执行中失败
    pub fn fail_step(mut self, step_id: &str, times: u32) -> Self {
        self.failures
            .insert(step_id.to_string(), AtomicU32::new(times));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StepExecutor for ScriptedStepExecutor {
    async fn execute(&self, context: &StepContext) -> anyhow::Result<Value> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(context.step_id.clone());
        }
        if let Some(remaining) = self.failures.get(&context.step_id) {
            let failing = remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(anyhow::anyhow!("步骤 {} 模拟失败", context.step_id));
            }
        }
        Ok(json!({"step": context.step_id, "attempt": context.attempt}))
    }

    fn supports_step_type(&self, _step_type: &str) -> bool {
        true
    }

    fn name(&self) -> &str {
        "ScriptedStepExecutor"
    }
}

/// 返回固定结果并记录收到的故障事件
pub struct RecordingRemediation {
    outcome: RemediationOutcome,
    seen: Mutex<Vec<String>>,
}

impl RecordingRemediation {
    pub fn new(outcome: RemediationOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RemediationHook for RecordingRemediation {
    async fn remediate(&self, incident: &Incident) -> RemediationOutcome {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(incident.id.clone());
        }
        self.outcome.clone()
    }

    fn name(&self) -> &str {
        "RecordingRemediation"
    }
}

/// 写入指定状态的任务时先等待一段时间的存储，其余操作转发给内存存储
pub struct DelayedTaskStore {
    inner: InMemoryStore,
    slow_status: TaskStatus,
    delay: Duration,
}

impl DelayedTaskStore {
    pub fn new(slow_status: TaskStatus, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStore::new(),
            slow_status,
            delay,
        })
    }
}

#[async_trait]
impl StateStore for DelayedTaskStore {
    async fn save_worker(&self, worker: &Worker) -> AutomationResult<()> {
        self.inner.save_worker(worker).await
    }

    async fn save_task(&self, task: &Task) -> AutomationResult<()> {
        if task.status == self.slow_status {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.save_task(task).await
    }

    async fn save_plan(&self, plan: &ActionPlan) -> AutomationResult<()> {
        self.inner.save_plan(plan).await
    }

    async fn save_health_check(&self, check: &HealthCheck) -> AutomationResult<()> {
        self.inner.save_health_check(check).await
    }

    async fn remove_health_check(&self, id: &str) -> AutomationResult<()> {
        self.inner.remove_health_check(id).await
    }

    async fn save_incident(&self, incident: &Incident) -> AutomationResult<()> {
        self.inner.save_incident(incident).await
    }

    async fn load_snapshot(&self) -> AutomationResult<StateSnapshot> {
        self.inner.load_snapshot().await
    }

    fn name(&self) -> &str {
        "DelayedTaskStore"
    }
}
