use automation_core::models::WorkerRegistration;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::{
    error::ApiResult,
    response::{created, success},
    routes::AppState,
};

/// 注册Worker
pub async fn register_worker(
    State(state): State<AppState>,
    payload: Result<Json<WorkerRegistration>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(registration) = payload?;
    let worker = state.scheduler.register_worker(registration).await?;
    Ok(created(worker))
}

/// 获取Worker列表及池指标
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let status = state.scheduler.get_system_status().await;
    Ok(success(json!({
        "workers": status.workers,
        "performance_metrics": status.metrics,
    })))
}

pub async fn get_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.scheduler.get_worker(&id).await?))
}

pub async fn set_worker_offline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.scheduler.set_worker_offline(&id).await?))
}

pub async fn set_worker_online(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.scheduler.set_worker_online(&id).await?))
}
