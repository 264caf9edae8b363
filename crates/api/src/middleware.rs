use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::error::{internal_error_response, ApiError, InternalErrorDetail};
use crate::routes::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    info!("开始处理请求: {} {}", method, uri);

    let response = next.run(request).await;
    let duration = start.elapsed();

    info!(
        "完成请求处理: {} {} - 状态: {} - 耗时: {:?}",
        method,
        uri,
        response.status(),
        duration
    );

    response
}

/// 启用认证时，变更类请求必须携带有效的 `x-api-key`
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let auth = &state.api_config.auth;
    let mutating = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE]
        .contains(request.method());
    if !auth.enabled || !mutating {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !auth.accepts(provided) {
        warn!(
            "拒绝未认证的请求: {} {}",
            request.method(),
            request.uri().path()
        );
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

/// 非生产环境下把内部错误的原始信息附加到响应体中
pub async fn expose_internal_details(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if state.api_config.is_production() {
        return response;
    }
    match response.extensions().get::<InternalErrorDetail>() {
        Some(detail) => internal_error_response(Some(&detail.0)),
        None => response,
    }
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

pub fn trace_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}
