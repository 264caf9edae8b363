use std::sync::Arc;

use automation_core::config::ApiConfig;
use automation_dispatcher::{
    ActionPlanEngine, HealthMonitor, IncidentManager, MetricsAggregator, TaskScheduler,
};
use axum::{
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::handlers::{
    action_plans::{
        create_action_plan, execute_action_plan, get_action_plan, list_action_plans,
        list_templates, retry_action_plan,
    },
    health::health_check,
    health_checks::{
        get_health_check, list_health_checks, register_health_check, remove_health_check,
        run_health_check,
    },
    incidents::{get_incident, list_incidents, resolve_incident},
    system::{get_system_metrics, get_system_status},
    tasks::{assign_task, complete_task, get_task, list_tasks, start_task},
    workers::{get_worker, list_workers, register_worker, set_worker_offline, set_worker_online},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<TaskScheduler>,
    pub engine: Arc<ActionPlanEngine>,
    pub monitor: Arc<HealthMonitor>,
    pub incidents: Arc<IncidentManager>,
    pub aggregator: Arc<MetricsAggregator>,
    pub api_config: Arc<ApiConfig>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // Worker管理API
        .route("/api/workers", get(list_workers).post(register_worker))
        .route("/api/workers/{id}", get(get_worker))
        .route("/api/workers/{id}/offline", post(set_worker_offline))
        .route("/api/workers/{id}/online", post(set_worker_online))
        // 任务API
        .route("/api/tasks", get(list_tasks).post(assign_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/start", post(start_task))
        .route("/api/tasks/{id}/complete", post(complete_task))
        // 行动计划API
        .route("/api/action-plans/templates", get(list_templates))
        .route(
            "/api/action-plans",
            get(list_action_plans).post(create_action_plan),
        )
        .route("/api/action-plans/{id}", get(get_action_plan))
        .route("/api/action-plans/{id}/execute", post(execute_action_plan))
        .route("/api/action-plans/{id}/retry", post(retry_action_plan))
        // 健康检查与故障事件API
        .route(
            "/api/health-checks",
            get(list_health_checks).post(register_health_check),
        )
        .route(
            "/api/health-checks/{id}",
            get(get_health_check).delete(remove_health_check),
        )
        .route("/api/health-checks/{id}/run", post(run_health_check))
        .route("/api/incidents", get(list_incidents))
        .route("/api/incidents/{id}", get(get_incident))
        .route("/api/incidents/{id}/resolve", post(resolve_incident))
        // 系统监控API
        .route("/api/system/status", get(get_system_status))
        .route("/api/system/metrics", get(get_system_metrics))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "请求的接口不存在",
            "path": uri.path(),
            "method": method.as_str(),
        })),
    )
}
