//! 调度与自动化核心
//!
//! Worker注册与任务调度、行动计划引擎、健康监控与故障事件管理，
//! 以及汇总它们的只读指标。

pub mod action_plan;
pub mod health_monitor;
pub mod incident;
pub mod metrics;
pub mod policies;
pub mod remediation;
pub mod scheduler;
pub mod strategies;
pub mod templates;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod strategies_test;

pub use action_plan::{ActionPlanEngine, EngineConfig};
pub use health_monitor::{CheckRunOutcome, HealthMonitor, MonitorConfig};
pub use incident::IncidentManager;
pub use metrics::{AutomationMetrics, MetricsAggregator, PlanMetrics, SystemStatus};
pub use policies::*;
pub use remediation::PlanRemediation;
pub use scheduler::{Assignment, TaskMetrics, TaskScheduler, WorkerPoolMetrics, WorkerPoolStatus};
pub use strategies::*;
pub use templates::{builtin_templates, TemplateRegistry};
