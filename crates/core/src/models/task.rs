use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务优先级
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Urgent,
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    /// 数值越大越优先
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::Urgent => 3,
            TaskPriority::High => 2,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Urgent => "urgent",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub priority: TaskPriority,
    pub category: String,
    pub data: serde_json::Value,
    pub workflow: Option<String>,
    pub required_capabilities: BTreeSet<String>,
    pub status: TaskStatus,
    pub assigned_worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// 任务提交请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default, alias = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub workflow: Option<String>,
}

impl TaskRequest {
    pub fn of_type(task_type: impl Into<String>) -> Self {
        Self {
            task_type: Some(task_type.into()),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// 任务执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded {
        #[serde(default)]
        result: serde_json::Value,
    },
    Failed {
        error: String,
    },
}

impl TaskOutcome {
    pub fn success(result: serde_json::Value) -> Self {
        TaskOutcome::Succeeded { result }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

/// 优先级/分类策略的输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub priority: TaskPriority,
    pub category: String,
}

/// 任务查询过滤条件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<String>,
    pub worker_id: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self
                .task_type
                .as_ref()
                .map_or(true, |t| &task.task_type == t)
            && self
                .worker_id
                .as_ref()
                .map_or(true, |w| task.assigned_worker_id.as_ref() == Some(w))
    }
}

impl Task {
    /// 创建待调度的任务
    pub fn new(
        task_type: String,
        classification: Classification,
        data: serde_json::Value,
        workflow: Option<String>,
        required_capabilities: BTreeSet<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_type,
            priority: classification.priority,
            category: classification.category,
            data,
            workflow,
            required_capabilities,
            status: TaskStatus::Pending,
            assigned_worker_id: None,
            created_at: Utc::now(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            result: None,
            error: None,
        }
    }

    /// 队列排序：优先级降序，提交时间升序
    pub fn queue_order(&self, other: &Task) -> Ordering {
        other
            .priority
            .rank()
            .cmp(&self.priority.rank())
            .then_with(|| self.created_at.cmp(&other.created_at))
    }

    /// 执行耗时（毫秒），未结束时返回None
    pub fn duration_ms(&self) -> Option<f64> {
        let completed_at = self.completed_at?;
        let started = self.started_at.or(self.assigned_at)?;
        Some((completed_at - started).num_milliseconds().max(0) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(priority: TaskPriority) -> Task {
        Task::new(
            "build".to_string(),
            Classification {
                priority,
                category: "general".to_string(),
            },
            serde_json::Value::Null,
            None,
            BTreeSet::new(),
        )
    }

    #[test]
    fn test_queue_order_priority_then_age() {
        let mut older_low = task(TaskPriority::Low);
        older_low.created_at = Utc::now() - Duration::seconds(10);
        let urgent = task(TaskPriority::Urgent);
        let mut older_urgent = task(TaskPriority::Urgent);
        older_urgent.created_at = urgent.created_at - Duration::seconds(1);

        assert_eq!(urgent.queue_order(&older_low), Ordering::Less);
        assert_eq!(older_urgent.queue_order(&urgent), Ordering::Less);
    }

    #[test]
    fn test_request_accepts_type_alias() {
        let request: TaskRequest =
            serde_json::from_value(serde_json::json!({"type": "build", "priority": "high"}))
                .unwrap();
        assert_eq!(request.task_type.as_deref(), Some("build"));
        assert_eq!(request.priority, Some(TaskPriority::High));
    }

    #[test]
    fn test_filter_matches() {
        let mut t = task(TaskPriority::Medium);
        t.status = TaskStatus::Assigned;
        t.assigned_worker_id = Some("w1".to_string());

        let filter = TaskFilter {
            status: Some(TaskStatus::Assigned),
            task_type: None,
            worker_id: Some("w1".to_string()),
        };
        assert!(filter.matches(&t));
        assert!(!TaskFilter {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        }
        .matches(&t));
    }
}
