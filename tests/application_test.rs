use automation::app::Application;
use automation_core::config::AppConfig;
use automation_core::models::{
    HealthCheckRegistration, PlanStatus, ProbeSpec, TaskOutcome, TaskRequest,
};
use serde_json::json;
use tempfile::TempDir;

fn file_backed_config(dir: &TempDir, extra: &str) -> AppConfig {
    let path = dir.path().join("state.json");
    let toml = format!(
        r#"
[api]
enabled = false

[storage]
backend = "json_file"
path = "{}"

[[scheduler.seed_workers]]
id = "seed-1"
type = "build"
capabilities = ["build"]

{extra}
"#,
        path.display().to_string().replace('\\', "/")
    );
    AppConfig::from_toml(&toml).unwrap()
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();

    let (task_id, plan_id, incident_id) = {
        let app = Application::new(file_backed_config(&dir, "")).await.unwrap();
        let assignment = app
            .scheduler()
            .assign_task(TaskRequest::of_type("build"))
            .await
            .unwrap();
        let task_id = assignment.task().id.clone();
        app.scheduler()
            .complete_task(&task_id, TaskOutcome::success(json!({"ok": true})))
            .await
            .unwrap();

        let plan = app
            .engine()
            .create_action_plan("system-check", json!({}))
            .await
            .unwrap();

        app.monitor()
            .register_health_check(
                HealthCheckRegistration::new("db", "数据库", "database")
                    .with_threshold(1)
                    .with_interval_ms(60_000)
                    .with_probe(ProbeSpec::Static { healthy: false }),
            )
            .await
            .unwrap();
        let incident = app
            .monitor()
            .run_check_once("db")
            .await
            .unwrap()
            .incident_opened
            .unwrap();
        app.monitor().shutdown().await;
        (task_id, plan.id, incident.id)
    };

    let app = Application::new(file_backed_config(&dir, "")).await.unwrap();

    // 预注册的Worker已存在时不会重复注册
    let workers = app.scheduler().list_workers().await;
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].performance.tasks_completed, 1);

    let task = app.scheduler().get_task(&task_id).await.unwrap();
    assert!(task.result.is_some());

    let plan = app.engine().get_action_plan(&plan_id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Created);

    let incident = app.incidents().get_incident(&incident_id).await.unwrap();
    assert!(incident.is_open());
    assert_eq!(app.monitor().list_health_checks().await.len(), 1);
    app.monitor().shutdown().await;
}

#[tokio::test]
async fn test_invalid_template_dependency_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = file_backed_config(
        &dir,
        r#"
[[action_plans.templates]]
id = "orphan"
name = "孤立模板"
dependencies = ["does-not-exist"]

[[action_plans.templates.steps]]
id = "noop"
name = "空操作"
step_type = "noop"
"#,
    );

    assert!(Application::new(config).await.is_err());
}

#[tokio::test]
async fn test_remediation_with_unknown_template_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = file_backed_config(
        &dir,
        r#"
[remediation]
enabled = true

[remediation.templates]
database = "missing-template"
"#,
    );

    assert!(Application::new(config).await.is_err());
}
