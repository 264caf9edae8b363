use std::collections::BTreeSet;
use std::sync::Arc;

use automation_core::{
    models::{Classification, TaskPriority},
    traits::{CapabilityPolicy, ClassificationPolicy},
    AutomationError, AutomationResult,
};

/// 默认能力策略：任务类型本身即为所需能力
#[derive(Debug, Default, Clone)]
pub struct TaskTypeCapabilityPolicy;

impl CapabilityPolicy for TaskTypeCapabilityPolicy {
    fn required_capabilities(
        &self,
        task_type: &str,
        _data: &serde_json::Value,
    ) -> BTreeSet<String> {
        BTreeSet::from([task_type.to_string()])
    }

    fn name(&self) -> &str {
        "TaskType"
    }
}

/// 默认分类策略：medium / general
#[derive(Debug, Default, Clone)]
pub struct DefaultClassificationPolicy;

impl ClassificationPolicy for DefaultClassificationPolicy {
    fn classify(&self, _task_type: &str, _data: &serde_json::Value) -> Classification {
        Classification {
            priority: TaskPriority::Medium,
            category: "general".to_string(),
        }
    }

    fn name(&self) -> &str {
        "Default"
    }
}

/// 关键字分类策略
///
/// 在任务类型和序列化后的任务数据中查找关键字（不区分大小写），
/// 推断优先级和分类。
#[derive(Debug, Default, Clone)]
pub struct KeywordClassificationPolicy;

const PRIORITY_KEYWORDS: &[(&[&str], TaskPriority)] = &[
    (&["urgent", "critical", "asap"], TaskPriority::Urgent),
    (&["important"], TaskPriority::High),
    (&["later", "minor"], TaskPriority::Low),
];

const CATEGORY_KEYWORDS: &[(&[&str], &str)] = &[
    (&["security"], "security"),
    (&["performance"], "performance"),
    (&["maintenance"], "maintenance"),
    (&["user", "ui"], "user_facing"),
];

impl ClassificationPolicy for KeywordClassificationPolicy {
    fn classify(&self, task_type: &str, data: &serde_json::Value) -> Classification {
        let haystack = format!("{} {}", task_type, data).to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| haystack.contains(w));

        let priority = PRIORITY_KEYWORDS
            .iter()
            .find(|(words, _)| contains_any(words))
            .map(|(_, priority)| *priority)
            .unwrap_or(TaskPriority::Medium);
        let category = CATEGORY_KEYWORDS
            .iter()
            .find(|(words, _)| contains_any(words))
            .map(|(_, category)| *category)
            .unwrap_or("general");

        Classification {
            priority,
            category: category.to_string(),
        }
    }

    fn name(&self) -> &str {
        "Keyword"
    }
}

/// 根据配置名称创建分类策略
pub fn create_classification_policy(name: &str) -> AutomationResult<Arc<dyn ClassificationPolicy>> {
    match name {
        "default" => Ok(Arc::new(DefaultClassificationPolicy)),
        "keyword" => Ok(Arc::new(KeywordClassificationPolicy)),
        other => Err(AutomationError::Configuration(format!(
            "未知的分类策略: {other}"
        ))),
    }
}
