//! 只读的状态汇总，每次调用都重新计算

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use automation_core::models::{
    ActionPlan, CheckStreak, IncidentStats, PlanFilter, PlanStatus, Worker,
};

use crate::action_plan::ActionPlanEngine;
use crate::health_monitor::HealthMonitor;
use crate::incident::IncidentManager;
use crate::scheduler::{TaskMetrics, TaskScheduler, WorkerPoolMetrics};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PlanMetrics {
    pub total: usize,
    /// 正在运行的计划数
    pub active: usize,
    pub created: usize,
    pub completed: usize,
    pub failed: usize,
    pub average_progress: f64,
}

impl PlanMetrics {
    fn from_plans(plans: &[ActionPlan]) -> Self {
        let count = |status: PlanStatus| plans.iter().filter(|p| p.status == status).count();
        let average_progress = if plans.is_empty() {
            0.0
        } else {
            plans.iter().map(|p| f64::from(p.progress)).sum::<f64>() / plans.len() as f64
        };
        Self {
            total: plans.len(),
            active: count(PlanStatus::Running),
            created: count(PlanStatus::Created),
            completed: count(PlanStatus::Completed),
            failed: count(PlanStatus::Failed),
            average_progress,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSummary {
    pub total_checks: usize,
    pub failing_checks: usize,
    pub streaks: Vec<CheckStreak>,
}

/// 系统状态快照
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub workers: Vec<Worker>,
    pub worker_metrics: WorkerPoolMetrics,
    pub task_metrics: TaskMetrics,
    pub plan_metrics: PlanMetrics,
    pub incident_stats: IncidentStats,
    pub health: HealthSummary,
    pub generated_at: DateTime<Utc>,
}

/// 扁平的关键指标
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AutomationMetrics {
    pub total_workers: usize,
    pub active_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub offline_workers: usize,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub queue_depth: usize,
    pub average_task_duration_ms: f64,
    pub total_plans: usize,
    pub active_plans: usize,
    pub completed_plans: usize,
    pub failed_plans: usize,
    pub average_plan_progress: f64,
    pub total_health_checks: usize,
    pub failing_health_checks: usize,
    pub total_incidents: usize,
    pub active_incidents: usize,
    pub escalated_incidents: usize,
    pub average_recovery_time_ms: f64,
}

pub struct MetricsAggregator {
    scheduler: Arc<TaskScheduler>,
    engine: Arc<ActionPlanEngine>,
    monitor: Arc<HealthMonitor>,
    incidents: Arc<IncidentManager>,
}

impl MetricsAggregator {
    pub fn new(
        scheduler: Arc<TaskScheduler>,
        engine: Arc<ActionPlanEngine>,
        monitor: Arc<HealthMonitor>,
        incidents: Arc<IncidentManager>,
    ) -> Self {
        Self {
            scheduler,
            engine,
            monitor,
            incidents,
        }
    }

    pub async fn system_status(&self) -> SystemStatus {
        let pool = self.scheduler.get_system_status().await;
        let task_metrics = self.scheduler.task_metrics().await;
        let plans = self.engine.get_action_plans(&PlanFilter::default()).await;
        let streaks = self.monitor.streaks().await;

        SystemStatus {
            workers: pool.workers,
            worker_metrics: pool.metrics,
            task_metrics,
            plan_metrics: PlanMetrics::from_plans(&plans),
            incident_stats: self.incidents.stats().await,
            health: HealthSummary {
                total_checks: streaks.len(),
                failing_checks: streaks
                    .iter()
                    .filter(|s| s.consecutive_failures > 0)
                    .count(),
                streaks,
            },
            generated_at: Utc::now(),
        }
    }

    pub async fn metrics(&self) -> AutomationMetrics {
        let status = self.system_status().await;
        let workers = &status.worker_metrics;
        let tasks = &status.task_metrics;
        let plans = &status.plan_metrics;
        let incidents = &status.incident_stats;

        AutomationMetrics {
            total_workers: workers.total_workers,
            active_workers: workers.active_workers,
            idle_workers: workers.idle_workers,
            busy_workers: workers.busy_workers,
            offline_workers: workers.offline_workers,
            total_tasks: tasks.total,
            pending_tasks: tasks.pending,
            running_tasks: tasks.running,
            completed_tasks: tasks.completed,
            failed_tasks: tasks.failed,
            queue_depth: tasks.queue_depth,
            average_task_duration_ms: tasks.average_duration_ms,
            total_plans: plans.total,
            active_plans: plans.active,
            completed_plans: plans.completed,
            failed_plans: plans.failed,
            average_plan_progress: plans.average_progress,
            total_health_checks: status.health.total_checks,
            failing_health_checks: status.health.failing_checks,
            total_incidents: incidents.total,
            active_incidents: incidents.active,
            escalated_incidents: incidents.escalated,
            average_recovery_time_ms: incidents.average_recovery_time_ms,
        }
    }
}
