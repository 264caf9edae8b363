use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Offline,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker累计性能指标
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerPerformance {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub average_duration_ms: f64,
}

impl WorkerPerformance {
    /// 已结束的任务数（成功+失败）
    pub fn finished(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }

    /// 记录一次任务结束，滚动更新平均耗时
    pub fn record(&mut self, succeeded: bool, duration_ms: f64) {
        if succeeded {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        let n = self.finished() as f64;
        self.average_duration_ms += (duration_ms - self.average_duration_ms) / n;
    }
}

/// Worker节点信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub worker_type: String,
    pub capabilities: BTreeSet<String>,
    pub status: WorkerStatus,
    pub current_task_id: Option<String>,
    pub performance: WorkerPerformance,
    pub registered_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// 注册顺序，负载相同时用于决定优先级
    pub registration_seq: u64,
}

/// Worker注册请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerRegistration {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "type")]
    pub worker_type: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl WorkerRegistration {
    pub fn new(id: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: None,
            worker_type: None,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Worker {
    /// 创建新的Worker信息
    pub fn new(registration: WorkerRegistration, registration_seq: u64) -> Self {
        let now = Utc::now();
        let name = registration
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| registration.id.clone());
        Self {
            id: registration.id,
            name,
            worker_type: registration
                .worker_type
                .unwrap_or_else(|| "general".to_string()),
            capabilities: registration
                .capabilities
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            status: WorkerStatus::Idle,
            current_task_id: None,
            performance: WorkerPerformance::default(),
            registered_at: now,
            last_activity: now,
            registration_seq,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Idle
    }

    /// Worker能力集合是否覆盖任务所需能力
    pub fn can_handle(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// 负载：已结束任务数加上正在运行的任务数
    pub fn load(&self) -> u64 {
        let running = u64::from(self.current_task_id.is_some());
        self.performance.finished() + running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worker_defaults() {
        let worker = Worker::new(WorkerRegistration::new("w1", &["build", " "]), 1);
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert_eq!(worker.name, "w1");
        assert_eq!(worker.worker_type, "general");
        assert_eq!(worker.capabilities.len(), 1);
        assert_eq!(worker.performance, WorkerPerformance::default());
    }

    #[test]
    fn test_can_handle_requires_superset() {
        let worker = Worker::new(WorkerRegistration::new("w1", &["build", "test"]), 1);
        let build: BTreeSet<String> = ["build".to_string()].into();
        let deploy: BTreeSet<String> = ["build".to_string(), "deploy".to_string()].into();
        assert!(worker.can_handle(&build));
        assert!(worker.can_handle(&BTreeSet::new()));
        assert!(!worker.can_handle(&deploy));
    }

    #[test]
    fn test_performance_rolling_average() {
        let mut perf = WorkerPerformance::default();
        perf.record(true, 100.0);
        perf.record(false, 300.0);
        assert_eq!(perf.tasks_completed, 1);
        assert_eq!(perf.tasks_failed, 1);
        assert!((perf.average_duration_ms - 200.0).abs() < f64::EPSILON);
    }
}
