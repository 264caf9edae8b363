//! 本地步骤执行与健康探测接口
//!
//! 行动计划中 `local` 方式的步骤交给 [`StepExecutor`] 执行；
//! 健康检查的每次运行调用 [`HealthProbe`]。两者都只返回成功或失败，
//! 超时由调用方统一包装。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    models::{Incident, ProbeSpec},
    AutomationResult,
};

/// 步骤执行上下文
#[derive(Debug, Clone)]
pub struct StepContext {
    pub plan_id: String,
    pub step_id: String,
    pub step_type: String,
    pub parameters: Value,
    /// 本次执行内的第几次尝试，从1开始
    pub attempt: u32,
}

/// 本地步骤执行器接口
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// 执行步骤，成功时返回输出
    async fn execute(&self, context: &StepContext) -> anyhow::Result<Value>;

    /// 是否支持该步骤类型
    fn supports_step_type(&self, step_type: &str) -> bool;

    fn name(&self) -> &str;
}

/// 健康探针接口
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// 执行一次探测，失败时返回原因
    async fn check(&self) -> anyhow::Result<()>;

    fn describe(&self) -> String;
}

/// 根据探针配置构造探针
pub trait ProbeFactory: Send + Sync {
    fn create(&self, spec: &ProbeSpec) -> AutomationResult<Arc<dyn HealthProbe>>;
}

/// 修复钩子的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    /// 修复成功，自动解决故障事件
    Resolved {
        resolution: String,
        plan_id: Option<String>,
    },
    /// 修复失败，需要人工介入
    Escalated {
        reason: String,
        plan_id: Option<String>,
    },
    /// 没有适用的修复手段
    Skipped,
}

/// 故障事件打开后触发的修复钩子
#[async_trait]
pub trait RemediationHook: Send + Sync {
    async fn remediate(&self, incident: &Incident) -> RemediationOutcome;

    fn name(&self) -> &str;
}
