use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::task::TaskPriority;
use crate::errors::{AutomationError, AutomationResult};

fn default_category() -> String {
    "general".to_string()
}

fn default_retry_attempts() -> u32 {
    1
}

/// 步骤执行方式
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StepDispatch {
    /// 由本地执行器直接执行
    #[default]
    Local,
    /// 作为任务派发给Worker，等待其结束
    Task { task_type: String },
}

/// 模板中的步骤定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    pub name: String,
    pub step_type: String,
    #[serde(default)]
    pub dispatch: StepDispatch,
    #[serde(default)]
    pub parameters: Value,
    /// 单次执行内的尝试次数
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl StepDefinition {
    pub fn local(id: &str, name: &str, step_type: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            step_type: step_type.to_string(),
            dispatch: StepDispatch::Local,
            parameters: Value::Null,
            retry_attempts: default_retry_attempts(),
            timeout_seconds: None,
        }
    }

    pub fn task(id: &str, name: &str, task_type: &str) -> Self {
        Self {
            dispatch: StepDispatch::Task {
                task_type: task_type.to_string(),
            },
            ..Self::local(id, name, task_type)
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// 行动计划模板
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlanTemplate {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub priority: TaskPriority,
    /// 依赖的模板ID，须已有对应的已完成计划
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub steps: Vec<StepDefinition>,
}

impl ActionPlanTemplate {
    /// 校验模板自身结构，不检查依赖是否存在
    pub fn validate(&self) -> AutomationResult<()> {
        if self.id.trim().is_empty() {
            return Err(AutomationError::Configuration(
                "行动计划模板ID不能为空".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(AutomationError::Configuration(format!(
                "行动计划模板 {} 没有任何步骤",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(AutomationError::Configuration(format!(
                    "行动计划模板 {} 含有空的步骤ID",
                    self.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(AutomationError::Configuration(format!(
                    "行动计划模板 {} 步骤ID重复: {}",
                    self.id, step.id
                )));
            }
            if let StepDispatch::Task { task_type } = &step.dispatch {
                if task_type.trim().is_empty() {
                    return Err(AutomationError::Configuration(format!(
                        "行动计划模板 {} 的步骤 {} 缺少任务类型",
                        self.id, step.id
                    )));
                }
            }
        }
        if self.dependencies.iter().any(|d| d == &self.id) {
            return Err(AutomationError::Configuration(format!(
                "行动计划模板 {} 不能依赖自身",
                self.id
            )));
        }
        Ok(())
    }
}

/// 行动计划状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Created => "created",
            PlanStatus::Running => "running",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// 计划中已实例化的步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub name: String,
    pub step_type: String,
    pub dispatch: StepDispatch,
    pub parameters: Value,
    pub retry_attempts: u32,
    pub timeout_seconds: Option<u64>,
    pub status: StepStatus,
    /// 累计尝试次数，跨重试保留
    pub attempts: u32,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub task_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlanStep {
    fn from_definition(definition: &StepDefinition, data: &Value) -> Self {
        Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            step_type: definition.step_type.clone(),
            dispatch: definition.dispatch.clone(),
            parameters: bind_parameters(&definition.parameters, data),
            retry_attempts: definition.retry_attempts.max(1),
            timeout_seconds: definition.timeout_seconds,
            status: StepStatus::Pending,
            attempts: 0,
            output: None,
            error: None,
            task_id: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// 行动计划实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    pub id: String,
    pub template_id: String,
    pub name: String,
    pub category: String,
    pub priority: TaskPriority,
    pub data: Value,
    pub steps: Vec<PlanStep>,
    pub status: PlanStatus,
    pub current_step_index: usize,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// 请求执行时依赖未满足，等待后台扫描在依赖完成后执行
    #[serde(default)]
    pub deferred: bool,
}

impl ActionPlan {
    /// 由模板实例化计划，步骤参数绑定实例数据
    pub fn from_template(template: &ActionPlanTemplate, data: Value, max_retries: u32) -> Self {
        let steps = template
            .steps
            .iter()
            .map(|definition| PlanStep::from_definition(definition, &data))
            .collect();
        Self {
            id: Uuid::new_v4().to_string(),
            template_id: template.id.clone(),
            name: template.name.clone(),
            category: template.category.clone(),
            priority: template.priority,
            data,
            steps,
            status: PlanStatus::Created,
            current_step_index: 0,
            progress: 0,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            deferred: false,
        }
    }

    /// 第一个未完成步骤的下标，全部完成时返回None
    pub fn next_step_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| step.status != StepStatus::Completed)
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count()
    }

    pub fn recompute_progress(&mut self) {
        self.progress = if self.steps.is_empty() {
            100
        } else {
            ((self.completed_steps() as f64 / self.steps.len() as f64) * 100.0).round() as u8
        };
    }

    /// 将失败步骤重置为待执行，已完成步骤保持不变
    pub fn reset_failed_steps(&mut self) {
        for step in self
            .steps
            .iter_mut()
            .filter(|step| matches!(step.status, StepStatus::Failed | StepStatus::Running))
        {
            step.status = StepStatus::Pending;
            step.error = None;
            step.task_id = None;
            step.completed_at = None;
        }
    }
}

/// 将参数中的 `{{key}}` 占位符替换为实例数据中的值
///
/// 整个字符串恰好是一个占位符时保留原值类型，否则按字符串拼接；
/// 找不到的键保持原样。
pub fn bind_parameters(parameters: &Value, data: &Value) -> Value {
    match parameters {
        Value::String(s) => bind_string(s, data),
        Value::Array(items) => Value::Array(items.iter().map(|v| bind_parameters(v, data)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), bind_parameters(v, data)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn bind_string(template: &str, data: &Value) -> Value {
    let trimmed = template.trim();
    if let Some(key) = trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        if !key.contains("{{") {
            if let Some(value) = data.get(key.trim()) {
                return value.clone();
            }
        }
    }

    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match data.get(key) {
                    Some(Value::String(s)) => output.push_str(s),
                    Some(value) => output.push_str(&value.to_string()),
                    None => output.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    Value::String(output)
}

/// 行动计划查询过滤条件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanFilter {
    pub status: Option<PlanStatus>,
    pub category: Option<String>,
    pub priority: Option<TaskPriority>,
}

impl PlanFilter {
    pub fn matches(&self, plan: &ActionPlan) -> bool {
        self.status.map_or(true, |s| plan.status == s)
            && self.category.as_ref().map_or(true, |c| &plan.category == c)
            && self.priority.map_or(true, |p| plan.priority == p)
    }
}

/// 执行或重试行动计划的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecutionResult {
    pub success: bool,
    pub plan: ActionPlan,
    pub message: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> ActionPlanTemplate {
        ActionPlanTemplate {
            id: "deploy".to_string(),
            name: "部署".to_string(),
            category: "deployment".to_string(),
            priority: TaskPriority::High,
            dependencies: vec![],
            steps: vec![
                StepDefinition::local("backup", "备份", "backup")
                    .with_parameters(json!({"target": "{{version}}", "note": "v={{version}}"})),
                StepDefinition::task("deploy", "发布", "deploy"),
            ],
        }
    }

    #[test]
    fn test_bind_parameters_keeps_types_and_interpolates() {
        let bound = bind_parameters(
            &json!({"count": "{{n}}", "label": "run {{name}} x{{n}}", "missing": "{{nope}}"}),
            &json!({"n": 3, "name": "nightly"}),
        );
        assert_eq!(bound["count"], json!(3));
        assert_eq!(bound["label"], json!("run nightly x3"));
        assert_eq!(bound["missing"], json!("{{nope}}"));
    }

    #[test]
    fn test_plan_from_template() {
        let plan = ActionPlan::from_template(&template(), json!({"version": "1.2.0"}), 3);
        assert_eq!(plan.status, PlanStatus::Created);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].parameters["target"], json!("1.2.0"));
        assert_eq!(plan.steps[0].parameters["note"], json!("v=1.2.0"));
        assert_eq!(plan.next_step_index(), Some(0));
        assert_eq!(plan.max_retries, 3);
    }

    #[test]
    fn test_progress_and_reset() {
        let mut plan = ActionPlan::from_template(&template(), Value::Null, 3);
        plan.steps[0].status = StepStatus::Completed;
        plan.steps[1].status = StepStatus::Failed;
        plan.steps[1].error = Some("boom".to_string());
        plan.recompute_progress();
        assert_eq!(plan.progress, 50);

        plan.reset_failed_steps();
        assert_eq!(plan.steps[0].status, StepStatus::Completed);
        assert_eq!(plan.steps[1].status, StepStatus::Pending);
        assert!(plan.steps[1].error.is_none());
        assert_eq!(plan.next_step_index(), Some(1));
    }

    #[test]
    fn test_template_validation() {
        assert!(template().validate().is_ok());

        let mut empty = template();
        empty.steps.clear();
        assert!(empty.validate().is_err());

        let mut duplicate = template();
        duplicate.steps[1].id = "backup".to_string();
        assert!(duplicate.validate().is_err());
    }
}
