use std::sync::Arc;

use automation_api::{
    create_app,
    error::{ApiError, ApiResult},
    middleware::expose_internal_details,
    AppState,
};
use automation_core::config::{ApiConfig, AuthConfig};
use automation_dispatcher::test_utils::{
    test_engine, test_incidents, test_monitor, test_scheduler, ScriptedStepExecutor,
};
use automation_dispatcher::{EngineConfig, MetricsAggregator, MonitorConfig};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    routing::get as route_get,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn create_test_state(api_config: ApiConfig) -> AppState {
    let scheduler = test_scheduler();
    let engine = test_engine(
        Arc::clone(&scheduler),
        Arc::new(ScriptedStepExecutor::new()),
        EngineConfig::default(),
    );
    let incidents = Arc::new(test_incidents());
    let monitor = test_monitor(Arc::clone(&incidents), MonitorConfig::default());
    let aggregator = Arc::new(MetricsAggregator::new(
        Arc::clone(&scheduler),
        Arc::clone(&engine),
        Arc::clone(&monitor),
        Arc::clone(&incidents),
    ));
    AppState {
        scheduler,
        engine,
        monitor,
        incidents,
        aggregator,
        api_config: Arc::new(api_config),
    }
}

fn create_test_app() -> Router {
    create_app(create_test_state(ApiConfig::default()))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    read_json(response).await
}

async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_worker_registration_and_task_assignment() {
    let app = create_test_app();

    let (status, body) = send(
        &app,
        post(
            "/api/workers",
            json!({"id": "builder-1", "type": "build", "capabilities": ["build"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], "builder-1");
    assert_eq!(body["data"]["status"], "idle");

    let (status, body) = send(&app, post("/api/workers", json!({"id": "builder-1"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "DUPLICATE_WORKER");

    let (status, body) = send(&app, post("/api/tasks", json!({"type": "build"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["worker"]["id"], "builder-1");
    let first_task = body["task"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, post("/api/tasks", json!({"type": "build"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], false);
    assert_eq!(body["queued"], true);
    assert_eq!(body["position"], 1);

    let (status, body) = send(&app, get("/api/workers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["workers"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["performance_metrics"]["queue_depth"], 1);

    let uri = format!("/api/tasks/{}/complete", first_task);
    let (status, body) = send(&app, post(&uri, json!({"result": {"artifacts": 2}}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");

    // 完成后Worker空闲，排队的任务被自动分配
    let (_, body) = send(&app, get("/api/tasks?status=assigned")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_task_validation_and_lookup_errors() {
    let app = create_test_app();

    let (status, body) = send(&app, post("/api/tasks", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send(&app, get("/api/tasks/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "TASK_NOT_FOUND");

    let (status, _) = send(&app, post("/api/workers/ghost/offline", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/workers")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_action_plan_lifecycle() {
    let app = create_test_app();

    let (status, body) = send(&app, get("/api/action-plans/templates")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    let (status, body) = send(
        &app,
        post(
            "/api/action-plans",
            json!({"template_id": "system-check", "data": {"host": "db-1"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "created");
    let plan_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post(&format!("/api/action-plans/{}/execute", plan_id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["plan"]["status"], "completed");
    assert_eq!(body["plan"]["progress"], 100);

    let (status, body) = send(
        &app,
        post(&format!("/api/action-plans/{}/execute", plan_id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "INVALID_PLAN_STATE");

    let (_, body) = send(&app, get("/api/action-plans?status=completed")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        post("/api/action-plans", json!({"template_id": "no-such-template"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check_incident_flow() {
    let app = create_test_app();

    let (status, body) = send(
        &app,
        post(
            "/api/health-checks",
            json!({
                "id": "db",
                "name": "主数据库",
                "type": "database",
                "threshold": 1,
                "interval": 60000,
                "probe": {"kind": "static", "healthy": false}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["threshold"], 1);

    let (status, body) = send(&app, post("/api/health-checks/db/run", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["healthy"], false);

    let (_, body) = send(&app, get("/api/incidents?status=active")).await;
    let active = body["data"].as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["severity"], "critical");
    let incident_id = active[0]["id"].as_str().unwrap().to_string();

    let resolve_uri = format!("/api/incidents/{}/resolve", incident_id);
    let (status, _) = send(&app, post(&resolve_uri, json!({"resolution": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, post(&resolve_uri, json!({"resolution": "重启数据库"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "resolved");
    assert_eq!(body["data"]["resolved_by"], "manual");

    let (status, _) = send(&app, post(&resolve_uri, json!({"resolution": "再次解决"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, get("/api/incidents?status=bogus")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/api/health-checks/db")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get("/api/health-checks")).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_system_status_and_metrics() {
    let app = create_test_app();
    send(
        &app,
        post("/api/workers", json!({"id": "w1", "capabilities": ["build"]})),
    )
    .await;

    let (status, body) = send(&app, get("/api/system/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["worker_metrics"]["total_workers"], 1);

    let (status, body) = send(&app, get("/api/system/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_workers"], 1);
}

#[tokio::test]
async fn test_unknown_route_returns_404_envelope() {
    let app = create_test_app();
    let (status, body) = send(&app, get("/api/nothing-here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["path"], "/api/nothing-here");
    assert_eq!(body["method"], "GET");
}

#[tokio::test]
async fn test_api_key_required_for_mutations() {
    let app = create_app(create_test_state(ApiConfig {
        auth: AuthConfig {
            enabled: true,
            api_keys: vec!["secret-key".to_string()],
        },
        ..Default::default()
    }));

    let (status, body) = send(&app, post("/api/workers", json!({"id": "w1"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "UNAUTHORIZED");

    let mut request = post("/api/workers", json!({"id": "w1"}));
    request
        .headers_mut()
        .insert("x-api-key", "wrong".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = post("/api/workers", json!({"id": "w1"}));
    request
        .headers_mut()
        .insert("x-api-key", "secret-key".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);

    // 只读请求不需要认证
    let (status, _) = send(&app, get("/api/workers")).await;
    assert_eq!(status, StatusCode::OK);
}

async fn failing_handler() -> ApiResult<&'static str> {
    Err(ApiError::Internal("存储后端不可用".to_string()))
}

fn internal_error_app(environment: &str) -> Router {
    let state = create_test_state(ApiConfig {
        environment: environment.to_string(),
        ..Default::default()
    });
    Router::new()
        .route("/boom", route_get(failing_handler))
        .layer(axum::middleware::from_fn_with_state(
            state,
            expose_internal_details,
        ))
}

#[tokio::test]
async fn test_internal_error_details_hidden_in_production() {
    let (status, body) = send(&internal_error_app("development"), get("/boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["details"]
        .as_str()
        .unwrap()
        .contains("存储后端不可用"));

    let (status, body) = send(&internal_error_app("production"), get("/boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].get("details").is_none());
    assert_eq!(body["message"], "系统内部错误");
}
