use automation_core::models::HealthCheckRegistration;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};

use crate::{
    error::ApiResult,
    response::{created, success, success_with_message},
    routes::AppState,
};

pub async fn register_health_check(
    State(state): State<AppState>,
    payload: Result<Json<HealthCheckRegistration>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(registration) = payload?;
    let check = state.monitor.register_health_check(registration).await?;
    Ok(created(check))
}

pub async fn list_health_checks(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.monitor.list_health_checks().await))
}

pub async fn get_health_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.monitor.get_health_check(&id).await?))
}

/// 手动触发一次检查
pub async fn run_health_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.monitor.run_check_once(&id).await?))
}

pub async fn remove_health_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let removed = state.monitor.remove_health_check(&id).await?;
    Ok(success_with_message(removed, format!("健康检查 {} 已移除", id)))
}
