//! # Automation API
//!
//! 自动化引擎的 HTTP 接口层，基于 axum 构建。
//!
//! ## 功能概述
//!
//! - Worker 注册、上下线与池指标查询
//! - 任务提交、启动与完成上报
//! - 行动计划模板查询、创建、执行与重试
//! - 健康检查注册、移除与故障事件处理
//! - 系统状态与指标汇总
//!
//! ## 响应格式
//!
//! 成功响应统一为 `{success, data, message, timestamp}`。任务提交和行动计划执行两个接口例外：
//! 前者直接返回 `{success, task, worker}` 或排队信息，后者原样返回执行结果。
//!
//! 错误响应：
//!
//! ```json
//! {
//!   "success": false,
//!   "message": "行动计划未找到: plan-1",
//!   "error": { "type": "PLAN_NOT_FOUND", "code": 404, "suggestions": [] },
//!   "timestamp": "2024-01-01T00:00:00Z"
//! }
//! ```
//!
//! ## 中间件
//!
//! - **追踪**: `tower-http` 的 `TraceLayer`
//! - **日志记录**: 请求开始与完成日志
//! - **CORS**: 由 `api.cors_enabled` 控制
//! - **认证**: 启用后变更类请求需要 `x-api-key`
//! - **错误细节**: 非生产环境下返回内部错误的原始信息
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use automation_api::{create_app, AppState};
//!
//! let app = create_app(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use middleware::{
    cors_layer, expose_internal_details, request_logging, require_api_key, trace_layer,
};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState) -> Router {
    let cors_enabled = state.api_config.cors_enabled;

    let mut app = create_routes(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state,
            expose_internal_details,
        ));

    if cors_enabled {
        app = app.layer(cors_layer());
    }

    app.layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
