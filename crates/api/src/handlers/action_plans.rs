use automation_core::models::PlanFilter;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::ApiResult,
    response::{created, success},
    routes::AppState,
};

/// 行动计划创建请求
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    #[serde(alias = "templateId")]
    pub template_id: String,
    #[serde(default)]
    pub data: Value,
}

pub async fn list_templates(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.engine.list_templates()))
}

pub async fn create_action_plan(
    State(state): State<AppState>,
    payload: Result<Json<CreatePlanRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let plan = state
        .engine
        .create_action_plan(&request.template_id, request.data)
        .await?;
    Ok(created(plan))
}

/// 获取行动计划列表，支持 status / category / priority 过滤
pub async fn list_action_plans(
    State(state): State<AppState>,
    query: Result<Query<PlanFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(filter) = query?;
    Ok(success(state.engine.get_action_plans(&filter).await))
}

pub async fn get_action_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.engine.get_action_plan(&id).await?))
}

/// 执行结果原样返回，失败的执行同样是 200
pub async fn execute_action_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.execute_action_plan(&id).await?))
}

pub async fn retry_action_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.retry_action_plan(&id).await?))
}
