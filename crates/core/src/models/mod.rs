pub mod action_plan;
pub mod health;
pub mod task;
pub mod worker;

pub use action_plan::{
    bind_parameters, ActionPlan, ActionPlanTemplate, PlanExecutionResult, PlanFilter, PlanStatus,
    PlanStep, StepDefinition, StepDispatch, StepStatus,
};
pub use health::{
    CheckStreak, HealthCheck, HealthCheckDefaults, HealthCheckRegistration, Incident,
    IncidentFilter, IncidentSeverity, IncidentStats, IncidentStatus, ProbeSpec, ResolvedBy,
};
pub use task::{
    Classification, Task, TaskFilter, TaskOutcome, TaskPriority, TaskRequest, TaskStatus,
};
pub use worker::{Worker, WorkerPerformance, WorkerRegistration, WorkerStatus};

use serde::{Deserialize, Serialize};

/// 存储端口导出/恢复用的完整状态快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub plans: Vec<ActionPlan>,
    #[serde(default)]
    pub health_checks: Vec<HealthCheck>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
            && self.tasks.is_empty()
            && self.plans.is_empty()
            && self.health_checks.is_empty()
            && self.incidents.is_empty()
    }
}
