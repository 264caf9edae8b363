use std::sync::Arc;

use async_trait::async_trait;
use automation_core::traits::{StepContext, StepExecutor};
use serde_json::{json, Value};
use tracing::{debug, info};

/// 按步骤类型分派的执行器注册表
///
/// 按注册顺序查找第一个支持该步骤类型的执行器，找不到时交给兜底执行器。
pub struct StepExecutorRegistry {
    executors: Vec<Arc<dyn StepExecutor>>,
    fallback: Arc<dyn StepExecutor>,
}

impl StepExecutorRegistry {
    pub fn new(fallback: Arc<dyn StepExecutor>) -> Self {
        Self {
            executors: Vec::new(),
            fallback,
        }
    }

    /// 默认注册表：HTTP请求步骤加上记录型兜底执行器
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(RecordingStepExecutor))
            .register(Arc::new(HttpStepExecutor::new(reqwest::Client::new())))
    }

    pub fn register(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executors.push(executor);
        self
    }

    fn resolve(&self, step_type: &str) -> &Arc<dyn StepExecutor> {
        self.executors
            .iter()
            .find(|e| e.supports_step_type(step_type))
            .unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl StepExecutor for StepExecutorRegistry {
    async fn execute(&self, context: &StepContext) -> anyhow::Result<Value> {
        let executor = self.resolve(&context.step_type);
        debug!(
            "步骤 {} (类型: {}) 交由执行器 {} 处理",
            context.step_id,
            context.step_type,
            executor.name()
        );
        executor.execute(context).await
    }

    fn supports_step_type(&self, _step_type: &str) -> bool {
        true
    }

    fn name(&self) -> &str {
        "registry"
    }
}

/// 兜底执行器：记录步骤执行并回显参数
pub struct RecordingStepExecutor;

#[async_trait]
impl StepExecutor for RecordingStepExecutor {
    async fn execute(&self, context: &StepContext) -> anyhow::Result<Value> {
        info!(
            plan_id = %context.plan_id,
            step_id = %context.step_id,
            step_type = %context.step_type,
            attempt = context.attempt,
            "执行本地步骤"
        );
        Ok(json!({
            "step_type": context.step_type,
            "parameters": context.parameters,
            "executed_at": chrono::Utc::now(),
        }))
    }

    fn supports_step_type(&self, _step_type: &str) -> bool {
        true
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// HTTP请求步骤
///
/// 参数：`url`（必填）、`method`（默认GET）、`body`、`expected_status`。
pub struct HttpStepExecutor {
    client: reqwest::Client,
}

impl HttpStepExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepExecutor for HttpStepExecutor {
    async fn execute(&self, context: &StepContext) -> anyhow::Result<Value> {
        let params = &context.parameters;
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("步骤 {} 缺少参数 url", context.step_id))?;
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            other => return Err(anyhow::anyhow!("不支持的HTTP方法: {other}")),
        };
        if let Some(body) = params.get("body") {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let ok = match params.get("expected_status").and_then(Value::as_u64) {
            Some(expected) => u64::from(status.as_u16()) == expected,
            None => status.is_success(),
        };
        if !ok {
            return Err(anyhow::anyhow!("{method} {url} 返回状态码 {status}"));
        }

        let body = response.text().await.unwrap_or_default();
        Ok(json!({ "status": status.as_u16(), "body": body }))
    }

    fn supports_step_type(&self, step_type: &str) -> bool {
        step_type == "http_request"
    }

    fn name(&self) -> &str {
        "http"
    }
}
