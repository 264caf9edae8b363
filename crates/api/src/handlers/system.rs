use axum::{extract::State, response::IntoResponse};

use crate::{error::ApiResult, response::success, routes::AppState};

/// 汇总所有组件的当前状态
pub async fn get_system_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.aggregator.system_status().await))
}

pub async fn get_system_metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.aggregator.metrics().await))
}
