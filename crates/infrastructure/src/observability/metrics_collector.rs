//! Metrics collector for the automation engine
//!
//! Thin wrapper over the `metrics` facade. Without an installed recorder
//! every call is a no-op, so components can record unconditionally.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// Metrics collector for scheduling, plan execution and health monitoring
pub struct MetricsCollector {
    // Task metrics
    tasks_submitted_total: Counter,
    tasks_assigned_total: Counter,
    tasks_queued_total: Counter,
    task_duration: Histogram,
    queue_depth: Gauge,

    // Worker metrics
    idle_workers: Gauge,

    // Action plan metrics
    plan_step_duration: Histogram,

    // Health metrics
    health_check_duration: Histogram,
    open_incidents: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_submitted_total: counter!("automation_tasks_submitted_total"),
            tasks_assigned_total: counter!("automation_tasks_assigned_total"),
            tasks_queued_total: counter!("automation_tasks_queued_total"),
            task_duration: histogram!("automation_task_duration_seconds"),
            queue_depth: gauge!("automation_queue_depth"),
            idle_workers: gauge!("automation_idle_workers"),
            plan_step_duration: histogram!("automation_plan_step_duration_seconds"),
            health_check_duration: histogram!("automation_health_check_duration_seconds"),
            open_incidents: gauge!("automation_open_incidents"),
        }
    }

    // Task metrics

    pub fn record_task_submitted(&self) {
        self.tasks_submitted_total.increment(1);
    }

    pub fn record_task_assigned(&self) {
        self.tasks_assigned_total.increment(1);
    }

    pub fn record_task_queued(&self) {
        self.tasks_queued_total.increment(1);
    }

    pub fn record_task_finished(&self, task_type: &str, succeeded: bool, duration_ms: f64) {
        let status = if succeeded { "completed" } else { "failed" };
        counter!(
            "automation_tasks_finished_total",
            "task_type" => task_type.to_string(),
            "status" => status
        )
        .increment(1);
        self.task_duration.record(duration_ms / 1000.0);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }

    pub fn set_idle_workers(&self, count: usize) {
        self.idle_workers.set(count as f64);
    }

    // Action plan metrics

    pub fn record_plan_execution(&self, template_id: &str, success: bool) {
        let status = if success { "completed" } else { "failed" };
        counter!(
            "automation_plan_executions_total",
            "template_id" => template_id.to_string(),
            "status" => status
        )
        .increment(1);
    }

    pub fn record_plan_retry(&self, template_id: &str) {
        counter!(
            "automation_plan_retries_total",
            "template_id" => template_id.to_string()
        )
        .increment(1);
    }

    pub fn record_step_duration(&self, duration_seconds: f64) {
        self.plan_step_duration.record(duration_seconds);
    }

    // Health metrics

    pub fn record_health_check_run(&self, check_type: &str, healthy: bool, duration_seconds: f64) {
        let result = if healthy { "healthy" } else { "unhealthy" };
        counter!(
            "automation_health_check_runs_total",
            "check_type" => check_type.to_string(),
            "result" => result
        )
        .increment(1);
        self.health_check_duration.record(duration_seconds);
    }

    pub fn record_incident_opened(&self, severity: &str) {
        counter!(
            "automation_incidents_opened_total",
            "severity" => severity.to_string()
        )
        .increment(1);
    }

    pub fn record_incident_resolved(&self, resolved_by: &str) {
        counter!(
            "automation_incidents_resolved_total",
            "resolved_by" => resolved_by.to_string()
        )
        .increment(1);
    }

    pub fn set_open_incidents(&self, count: usize) {
        self.open_incidents.set(count as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let collector = MetricsCollector::new();
        collector.record_task_submitted();
        collector.record_task_finished("build", true, 1500.0);
        collector.set_queue_depth(3);
        collector.record_plan_execution("system-check", false);
        collector.record_health_check_run("database", false, 0.2);
        collector.record_incident_opened("critical");
    }
}
