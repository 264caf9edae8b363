use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{ActionPlanTemplate, HealthCheckDefaults, WorkerRegistration};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub dispatch_strategy: String, // "least_loaded", "round_robin", "type_affinity"
    pub classification: String, // "default", "keyword"
    /// 启动时预注册的Worker
    pub seed_workers: Vec<WorkerRegistration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_strategy: "least_loaded".to_string(),
            classification: "default".to_string(),
            seed_workers: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_strategies = ["least_loaded", "round_robin", "type_affinity"];
        if !valid_strategies.contains(&self.dispatch_strategy.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的调度策略: {}，支持的策略: {:?}",
                self.dispatch_strategy,
                valid_strategies
            ));
        }

        if !["default", "keyword"].contains(&self.classification.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的分类策略: {}，支持的策略: default, keyword",
                self.classification
            ));
        }

        for worker in &self.seed_workers {
            if worker.id.trim().is_empty() {
                return Err(anyhow::anyhow!("预注册Worker的ID不能为空"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPlanConfig {
    pub max_retries: u32,
    /// 单次执行的总时限
    pub execution_timeout_seconds: u64,
    /// 扫描等待依赖的计划的间隔
    pub deferred_sweep_interval_ms: u64,
    /// 内置模板之外的自定义模板
    pub templates: Vec<ActionPlanTemplate>,
}

impl Default for ActionPlanConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            execution_timeout_seconds: 1800, // 30分钟
            deferred_sweep_interval_ms: 5000,
            templates: Vec::new(),
        }
    }
}

impl ActionPlanConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.execution_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("行动计划执行时限必须大于0"));
        }
        if self.deferred_sweep_interval_ms == 0 {
            return Err(anyhow::anyhow!("待执行计划的扫描间隔必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub default_interval_ms: u64,
    pub default_timeout_ms: u64,
    pub default_threshold: u32,
    /// 检查恢复成功时自动解决未关闭的故障事件
    pub auto_resolve_on_recovery: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let defaults = HealthCheckDefaults::default();
        Self {
            default_interval_ms: defaults.interval_ms,
            default_timeout_ms: defaults.timeout_ms,
            default_threshold: defaults.threshold,
            auto_resolve_on_recovery: false,
        }
    }
}

impl HealthConfig {
    pub fn defaults(&self) -> HealthCheckDefaults {
        HealthCheckDefaults {
            interval_ms: self.default_interval_ms,
            timeout_ms: self.default_timeout_ms,
            threshold: self.default_threshold,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_interval_ms == 0 {
            return Err(anyhow::anyhow!("默认检查间隔必须大于0"));
        }
        if self.default_timeout_ms == 0 {
            return Err(anyhow::anyhow!("默认检查超时必须大于0"));
        }
        if self.default_threshold == 0 {
            return Err(anyhow::anyhow!("默认失败阈值必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    pub enabled: bool,
    /// 检查类型 -> 修复用的行动计划模板ID
    pub templates: HashMap<String, String>,
}

impl RemediationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled && self.templates.is_empty() {
            return Err(anyhow::anyhow!("启用自动修复时必须配置检查类型到模板的映射"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: String, // "memory", "json_file"
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: "data/automation-state.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend.as_str() {
            "memory" => Ok(()),
            "json_file" if self.path.trim().is_empty() => {
                Err(anyhow::anyhow!("json_file 存储必须配置文件路径"))
            }
            "json_file" => Ok(()),
            other => Err(anyhow::anyhow!(
                "无效的存储后端: {}，支持: [\"memory\", \"json_file\"]",
                other
            )),
        }
    }
}
