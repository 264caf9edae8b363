//! 行动计划引擎
//!
//! 计划按步骤顺序执行。每一步执行期间不持有计划锁，
//! 状态更新通过 [`ActionPlanEngine::update_plan`] 短暂加锁完成，持久化也在锁内进行，
//! 存储中的记录因此不会比内存中的旧。
//!
//! 请求执行时依赖尚未完成的计划会被标记为等待，由后台扫描按优先级在依赖完成后执行。

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use automation_core::{
    config::ActionPlanConfig,
    models::{
        ActionPlan, ActionPlanTemplate, PlanExecutionResult, PlanFilter, PlanStatus, PlanStep,
        StepDispatch, StepStatus, TaskPriority, TaskRequest, TaskStatus,
    },
    traits::{StateStore, StepContext, StepExecutor},
    AutomationError, AutomationResult,
};
use automation_infrastructure::MetricsCollector;

use crate::scheduler::TaskScheduler;
use crate::templates::TemplateRegistry;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_retries: u32,
    /// 单次执行的总时限
    pub execution_timeout: Duration,
    pub deferred_sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&ActionPlanConfig::default())
    }
}

impl From<&ActionPlanConfig> for EngineConfig {
    fn from(config: &ActionPlanConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            execution_timeout: Duration::from_secs(config.execution_timeout_seconds),
            deferred_sweep_interval: Duration::from_millis(config.deferred_sweep_interval_ms),
        }
    }
}

/// 单次执行中步骤所需的计划信息
struct RunContext {
    plan_id: String,
    priority: TaskPriority,
    category: String,
    deadline: Instant,
}

struct Sweeper {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ActionPlanEngine {
    templates: TemplateRegistry,
    plans: RwLock<HashMap<String, ActionPlan>>,
    sweeper: Mutex<Option<Sweeper>>,
    scheduler: Arc<TaskScheduler>,
    executor: Arc<dyn StepExecutor>,
    store: Arc<dyn StateStore>,
    config: EngineConfig,
    metrics: Arc<MetricsCollector>,
}

impl ActionPlanEngine {
    pub fn new(
        templates: TemplateRegistry,
        scheduler: Arc<TaskScheduler>,
        executor: Arc<dyn StepExecutor>,
        store: Arc<dyn StateStore>,
        config: EngineConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            templates,
            plans: RwLock::new(HashMap::new()),
            sweeper: Mutex::new(None),
            scheduler,
            executor,
            store,
            config,
            metrics,
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn list_templates(&self) -> Vec<ActionPlanTemplate> {
        self.templates.list()
    }

    /// 由模板实例化行动计划
    pub async fn create_action_plan(&self, template_id: &str, data: Value) -> AutomationResult<ActionPlan> {
        let template = self.templates.get(template_id)?;
        let plan = ActionPlan::from_template(template, data, self.config.max_retries);

        let mut plans = self.plans.write().await;
        plans.insert(plan.id.clone(), plan.clone());
        self.persist(&plan).await;
        info!(
            "创建行动计划: {} (模板: {}, {} 个步骤)",
            plan.id,
            template_id,
            plan.steps.len()
        );
        Ok(plan)
    }

    /// 执行处于created状态的行动计划
    pub async fn execute_action_plan(&self, plan_id: &str) -> AutomationResult<PlanExecutionResult> {
        let started = {
            let mut plans = self.plans.write().await;
            let plan = plans
                .get(plan_id)
                .ok_or_else(|| AutomationError::PlanNotFound {
                    id: plan_id.to_string(),
                })?;
            if plan.status != PlanStatus::Created {
                return Err(AutomationError::InvalidPlanState {
                    id: plan_id.to_string(),
                    status: plan.status.to_string(),
                    operation: "execute".to_string(),
                });
            }

            let unmet = self.unmet_dependencies(&plans, &plan.template_id)?;
            let plan = plans
                .get_mut(plan_id)
                .ok_or_else(|| AutomationError::PlanNotFound {
                    id: plan_id.to_string(),
                })?;
            if !unmet.is_empty() {
                let message = format!("依赖的行动计划尚未完成: {}", unmet.join(", "));
                warn!("行动计划 {} 暂不执行，依赖完成后自动执行: {}", plan_id, message);
                if !plan.deferred {
                    plan.deferred = true;
                    let deferred = plan.clone();
                    self.persist(&deferred).await;
                }
                return Ok(PlanExecutionResult {
                    success: false,
                    plan: plan.clone(),
                    message: message.clone(),
                    error: Some(message),
                });
            }

            plan.status = PlanStatus::Running;
            plan.started_at = Some(Utc::now());
            plan.error = None;
            plan.deferred = false;
            let started = plan.clone();
            self.persist(&started).await;
            started
        };

        info!("开始执行行动计划: {} ({})", started.id, started.name);
        self.run_plan(&started).await
    }

    /// 模板依赖中还没有已完成计划的模板ID
    fn unmet_dependencies(
        &self,
        plans: &HashMap<String, ActionPlan>,
        template_id: &str,
    ) -> AutomationResult<Vec<String>> {
        let template = self.templates.get(template_id)?;
        Ok(template
            .dependencies
            .iter()
            .filter(|dep| {
                !plans
                    .values()
                    .any(|p| &p.template_id == *dep && p.status == PlanStatus::Completed)
            })
            .cloned()
            .collect())
    }

    /// 执行依赖已经满足的等待计划，按优先级从高到低、创建时间从早到晚
    pub async fn run_deferred_plans(&self) -> Vec<PlanExecutionResult> {
        let ready: Vec<String> = {
            let plans = self.plans.read().await;
            let mut ready: Vec<&ActionPlan> = plans
                .values()
                .filter(|p| p.deferred && p.status == PlanStatus::Created)
                .filter(|p| {
                    self.unmet_dependencies(&plans, &p.template_id)
                        .map(|unmet| unmet.is_empty())
                        .unwrap_or(false)
                })
                .collect();
            ready.sort_by(|a, b| {
                b.priority
                    .rank()
                    .cmp(&a.priority.rank())
                    .then_with(|| a.created_at.cmp(&b.created_at))
            });
            ready.iter().map(|p| p.id.clone()).collect()
        };

        let mut results = Vec::with_capacity(ready.len());
        for plan_id in ready {
            info!("依赖已完成，执行等待中的行动计划: {}", plan_id);
            match self.execute_action_plan(&plan_id).await {
                Ok(result) => results.push(result),
                // 扫描期间可能已被手动执行
                Err(e) => debug!("跳过等待中的行动计划 {}: {}", plan_id, e),
            }
        }
        results
    }

    /// 启动后台扫描，重复调用无效果
    pub async fn start_deferred_sweep(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let engine: Weak<Self> = Arc::downgrade(self);
        let period = self.config.deferred_sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(engine) = engine.upgrade() else {
                            break;
                        };
                        tokio::select! {
                            results = engine.run_deferred_plans() => {
                                if !results.is_empty() {
                                    debug!("本轮扫描执行了 {} 个等待中的行动计划", results.len());
                                }
                            }
                            _ = stop_rx.changed() => break,
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("等待计划扫描已停止");
        });

        info!("启动等待计划扫描，间隔: {}ms", period.as_millis());
        *sweeper = Some(Sweeper { stop_tx, handle });
    }

    /// 停止后台扫描；正在执行的计划被中断，重启恢复时标记为失败
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().await.take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.stop_tx.send(true);
            let _ = sweeper.handle.await;
            info!("行动计划引擎已停止");
        }
    }

    /// 重试失败的行动计划，从失败的步骤继续
    pub async fn retry_action_plan(&self, plan_id: &str) -> AutomationResult<PlanExecutionResult> {
        let (plan, exhausted) = {
            let mut plans = self.plans.write().await;
            let plan = plans
                .get_mut(plan_id)
                .ok_or_else(|| AutomationError::PlanNotFound {
                    id: plan_id.to_string(),
                })?;
            if plan.status != PlanStatus::Failed {
                return Err(AutomationError::InvalidPlanState {
                    id: plan_id.to_string(),
                    status: plan.status.to_string(),
                    operation: "retry".to_string(),
                });
            }

            plan.retry_count += 1;
            let exhausted = plan.retry_count > plan.max_retries;
            if !exhausted {
                plan.reset_failed_steps();
                plan.status = PlanStatus::Running;
                plan.error = None;
                plan.completed_at = None;
            }
            let plan = plan.clone();
            self.persist(&plan).await;
            (plan, exhausted)
        };

        if exhausted {
            warn!(
                "行动计划 {} 重试次数超过上限 ({}/{})",
                plan.id, plan.retry_count, plan.max_retries
            );
            return Err(AutomationError::RetryLimitExceeded {
                id: plan.id,
                max: plan.max_retries,
            });
        }

        info!(
            "重试行动计划: {} (第 {}/{} 次)",
            plan.id, plan.retry_count, plan.max_retries
        );
        self.metrics.record_plan_retry(&plan.template_id);
        self.run_plan(&plan).await
    }

    async fn run_plan(&self, plan: &ActionPlan) -> AutomationResult<PlanExecutionResult> {
        let run = RunContext {
            plan_id: plan.id.clone(),
            priority: plan.priority,
            category: plan.category.clone(),
            deadline: Instant::now() + self.config.execution_timeout,
        };

        loop {
            let (index, step) = {
                let plans = self.plans.read().await;
                let plan = plans
                    .get(&run.plan_id)
                    .ok_or_else(|| AutomationError::PlanNotFound {
                        id: run.plan_id.clone(),
                    })?;
                match plan.next_step_index() {
                    Some(index) => (index, plan.steps[index].clone()),
                    None => break,
                }
            };

            self.update_plan(&run.plan_id, |plan| {
                plan.current_step_index = index;
                let step = &mut plan.steps[index];
                step.status = StepStatus::Running;
                step.started_at = Some(Utc::now());
            })
            .await?;

            debug!("执行步骤: {} - {} ({})", run.plan_id, step.id, step.step_type);
            let started = Instant::now();
            let outcome = self.run_step(&run, index, &step).await;
            self.metrics
                .record_step_duration(started.elapsed().as_secs_f64());

            match outcome {
                Ok(output) => {
                    self.update_plan(&run.plan_id, |plan| {
                        let step = &mut plan.steps[index];
                        step.status = StepStatus::Completed;
                        step.output = Some(output);
                        step.error = None;
                        step.completed_at = Some(Utc::now());
                        plan.recompute_progress();
                    })
                    .await?;
                    info!("步骤完成: {} - {}", run.plan_id, step.name);
                }
                Err(message) => {
                    let failed = self
                        .update_plan(&run.plan_id, |plan| {
                            let step = &mut plan.steps[index];
                            step.status = StepStatus::Failed;
                            step.error = Some(message.clone());
                            step.completed_at = Some(Utc::now());
                            plan.status = PlanStatus::Failed;
                            plan.error = Some(message.clone());
                            plan.recompute_progress();
                        })
                        .await?;
                    error!("行动计划 {} 在步骤 {} 失败: {}", run.plan_id, step.id, message);
                    self.metrics.record_plan_execution(&failed.template_id, false);
                    return Ok(PlanExecutionResult {
                        success: false,
                        plan: failed,
                        message: format!("步骤 {} 执行失败", step.name),
                        error: Some(message),
                    });
                }
            }
        }

        let completed = self
            .update_plan(&run.plan_id, |plan| {
                plan.status = PlanStatus::Completed;
                plan.completed_at = Some(Utc::now());
                plan.current_step_index = plan.steps.len();
                plan.recompute_progress();
            })
            .await?;
        info!("行动计划执行完成: {} ({})", completed.id, completed.name);
        self.metrics.record_plan_execution(&completed.template_id, true);
        Ok(PlanExecutionResult {
            success: true,
            plan: completed,
            message: "行动计划执行完成".to_string(),
            error: None,
        })
    }

    /// 在步骤自身的尝试次数内执行，每次尝试受步骤超时和整体时限约束
    async fn run_step(&self, run: &RunContext, index: usize, step: &PlanStep) -> Result<Value, String> {
        let mut last_error = String::new();

        for attempt in 1..=step.retry_attempts.max(1) {
            let remaining = run.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(format!("行动计划 {} 执行超时", run.plan_id));
            }
            let bound = step
                .timeout_seconds
                .map(Duration::from_secs)
                .map_or(remaining, |limit| limit.min(remaining));

            if let Err(e) = self
                .update_plan(&run.plan_id, |plan| plan.steps[index].attempts += 1)
                .await
            {
                return Err(e.to_string());
            }

            let result = match &step.dispatch {
                StepDispatch::Local => self.run_local(run, step, attempt, bound).await,
                StepDispatch::Task { task_type } => {
                    self.run_task(run, index, step, task_type, bound).await
                }
            };

            match result {
                Ok(output) => return Ok(output),
                Err(message) => {
                    if attempt < step.retry_attempts {
                        info!(
                            "步骤重试: {} - {} ({}/{}): {}",
                            run.plan_id, step.name, attempt, step.retry_attempts, message
                        );
                    }
                    last_error = message;
                }
            }
        }

        Err(last_error)
    }

    async fn run_local(
        &self,
        run: &RunContext,
        step: &PlanStep,
        attempt: u32,
        bound: Duration,
    ) -> Result<Value, String> {
        let context = StepContext {
            plan_id: run.plan_id.clone(),
            step_id: step.id.clone(),
            step_type: step.step_type.clone(),
            parameters: step.parameters.clone(),
            attempt,
        };
        match tokio::time::timeout(bound, self.executor.execute(&context)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("步骤 {} 执行超时 ({}ms)", step.id, bound.as_millis())),
        }
    }

    /// 通过调度器派发任务并等待其结束
    async fn run_task(
        &self,
        run: &RunContext,
        index: usize,
        step: &PlanStep,
        task_type: &str,
        bound: Duration,
    ) -> Result<Value, String> {
        let request = TaskRequest {
            task_type: Some(task_type.to_string()),
            priority: Some(run.priority),
            category: Some(run.category.clone()),
            data: json!({
                "plan_id": run.plan_id,
                "step_id": step.id,
                "parameters": step.parameters,
            }),
            workflow: Some(run.plan_id.clone()),
        };
        let assignment = self
            .scheduler
            .assign_task(request)
            .await
            .map_err(|e| e.to_string())?;
        let task_id = assignment.task().id.clone();

        self.update_plan(&run.plan_id, |plan| {
            plan.steps[index].task_id = Some(task_id.clone());
        })
        .await
        .map_err(|e| e.to_string())?;

        let task = self
            .scheduler
            .wait_for_task(&task_id, bound)
            .await
            .map_err(|e| e.to_string())?;
        match task.status {
            TaskStatus::Completed => Ok(task.result.unwrap_or(Value::Null)),
            _ => Err(task
                .error
                .unwrap_or_else(|| format!("任务 {} 执行失败", task.id))),
        }
    }

    /// 加锁修改计划并持久化
    async fn update_plan<F>(&self, plan_id: &str, apply: F) -> AutomationResult<ActionPlan>
    where
        F: FnOnce(&mut ActionPlan),
    {
        let mut plans = self.plans.write().await;
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| AutomationError::PlanNotFound {
                id: plan_id.to_string(),
            })?;
        apply(plan);
        let updated = plan.clone();
        self.persist(&updated).await;
        Ok(updated)
    }

    async fn persist(&self, plan: &ActionPlan) {
        if let Err(e) = self.store.save_plan(plan).await {
            warn!("持久化行动计划 {} 失败 ({}): {}", plan.id, self.store.name(), e);
        }
    }

    pub async fn get_action_plan(&self, plan_id: &str) -> AutomationResult<ActionPlan> {
        self.plans
            .read()
            .await
            .get(plan_id)
            .cloned()
            .ok_or_else(|| AutomationError::PlanNotFound {
                id: plan_id.to_string(),
            })
    }

    pub async fn get_action_plans(&self, filter: &PlanFilter) -> Vec<ActionPlan> {
        let plans = self.plans.read().await;
        let mut matched: Vec<ActionPlan> = plans
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched
    }

    /// 恢复持久化的计划，重启前仍在运行的计划标记为失败
    pub async fn restore(&self, plans: Vec<ActionPlan>) {
        let mut table = self.plans.write().await;
        for mut plan in plans {
            if plan.status == PlanStatus::Running {
                plan.status = PlanStatus::Failed;
                plan.error = Some("服务重启，执行被中断".to_string());
                for step in plan
                    .steps
                    .iter_mut()
                    .filter(|s| s.status == StepStatus::Running)
                {
                    step.status = StepStatus::Failed;
                    step.error = plan.error.clone();
                }
                warn!("行动计划 {} 在重启前未完成，已标记为失败", plan.id);
                self.persist(&plan).await;
            }
            table.insert(plan.id.clone(), plan);
        }
        let deferred = table.values().filter(|p| p.deferred).count();
        info!("恢复行动计划: {} 个, 等待依赖 {} 个", table.len(), deferred);
    }
}
