use automation_core::models::{TaskFilter, TaskOutcome, TaskRequest};
use automation_dispatcher::Assignment;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{error::ApiResult, response::success, routes::AppState};

/// 任务完成上报
#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl From<CompleteTaskRequest> for TaskOutcome {
    fn from(request: CompleteTaskRequest) -> Self {
        if request.success {
            TaskOutcome::success(request.result)
        } else {
            TaskOutcome::failure(
                request
                    .error
                    .unwrap_or_else(|| "Worker报告任务失败".to_string()),
            )
        }
    }
}

/// 提交任务：有可用Worker时立即分配(200)，否则进入待处理队列(202)
pub async fn assign_task(
    State(state): State<AppState>,
    payload: Result<Json<TaskRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let response = match state.scheduler.assign_task(request).await? {
        Assignment::Assigned { task, worker } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "task": task,
                "worker": worker,
                "timestamp": chrono::Utc::now(),
            })),
        )
            .into_response(),
        Assignment::Queued { task, position } => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": false,
                "queued": true,
                "position": position,
                "task": task,
                "message": "暂无可用Worker，任务已进入待处理队列",
                "timestamp": chrono::Utc::now(),
            })),
        )
            .into_response(),
    };
    Ok(response)
}

/// 获取任务列表，支持 status / task_type / worker_id 过滤
pub async fn list_tasks(
    State(state): State<AppState>,
    query: Result<Query<TaskFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(filter) = query?;
    Ok(success(state.scheduler.list_tasks(&filter).await))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.scheduler.get_task(&id).await?))
}

pub async fn start_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.scheduler.start_task(&id).await?))
}

pub async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CompleteTaskRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let task = state.scheduler.complete_task(&id, request.into()).await?;
    Ok(success(task))
}
