use automation_core::config::*;
use automation_core::models::{StepDispatch, TaskPriority};
use std::fs;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert!(config.api.enabled);
    assert!(!config.api.is_production());
    assert_eq!(config.scheduler.dispatch_strategy, "least_loaded");
    assert_eq!(config.action_plans.max_retries, 3);
    assert_eq!(config.action_plans.deferred_sweep_interval_ms, 5000);
    assert_eq!(config.health.default_interval_ms, 30_000);
    assert_eq!(config.health.default_timeout_ms, 10_000);
    assert_eq!(config.health.default_threshold, 3);
    assert_eq!(config.storage.backend, "memory");
    assert!(!config.remediation.enabled);
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[api]
bind_address = "127.0.0.1:9000"
environment = "production"

[api.auth]
enabled = true
api_keys = ["secret-key"]

[scheduler]
dispatch_strategy = "round_robin"

[[scheduler.seed_workers]]
id = "w1"
name = "构建节点"
type = "builder"
capabilities = ["build", "test"]

[action_plans]
max_retries = 5
execution_timeout_seconds = 60

[[action_plans.templates]]
id = "rotate-logs"
name = "日志轮转"
category = "maintenance"
priority = "low"

[[action_plans.templates.steps]]
id = "compress"
name = "压缩日志"
step_type = "maintenance"

[[action_plans.templates.steps]]
id = "upload"
name = "上传归档"
step_type = "upload"
dispatch = { mode = "task", task_type = "upload" }
retry_attempts = 2

[health]
default_threshold = 5
auto_resolve_on_recovery = true

[remediation]
enabled = true

[remediation.templates]
database = "system-check"

[storage]
backend = "json_file"
path = "/tmp/automation-state.json"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.api.bind_address, "127.0.0.1:9000");
    assert!(config.api.is_production());
    assert!(config.api.auth.accepts("secret-key"));
    assert!(!config.api.auth.accepts("wrong"));
    assert_eq!(config.scheduler.dispatch_strategy, "round_robin");
    assert_eq!(config.scheduler.seed_workers.len(), 1);
    assert_eq!(
        config.scheduler.seed_workers[0].worker_type.as_deref(),
        Some("builder")
    );
    assert_eq!(config.action_plans.max_retries, 5);

    let template = &config.action_plans.templates[0];
    assert_eq!(template.priority, TaskPriority::Low);
    assert_eq!(template.steps.len(), 2);
    assert_eq!(template.steps[0].dispatch, StepDispatch::Local);
    assert_eq!(template.steps[0].retry_attempts, 1);
    assert_eq!(
        template.steps[1].dispatch,
        StepDispatch::Task {
            task_type: "upload".to_string()
        }
    );

    assert_eq!(config.health.default_threshold, 5);
    assert_eq!(config.health.default_interval_ms, 30_000);
    assert!(config.health.auto_resolve_on_recovery);
    assert_eq!(
        config.remediation.templates.get("database").map(String::as_str),
        Some("system-check")
    );
    assert_eq!(config.storage.backend, "json_file");
}

#[test]
fn test_invalid_strategy_rejected() {
    let toml_content = r#"
[scheduler]
dispatch_strategy = "random"
"#;
    let err = AppConfig::from_toml(toml_content).unwrap_err();
    assert!(format!("{err:#}").contains("random"));

    let err = AppConfig::from_toml("[scheduler]\nclassification = \"ml\"\n").unwrap_err();
    assert!(format!("{err:#}").contains("分类策略"));
}

#[test]
fn test_auth_requires_keys() {
    let mut config = AppConfig::default();
    config.api.auth.enabled = true;
    assert!(config.validate().is_err());

    config.api.auth.api_keys = vec!["k".to_string()];
    assert!(config.validate().is_ok());
}

#[test]
fn test_remediation_requires_mapping() {
    let mut config = AppConfig::default();
    config.remediation.enabled = true;
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_sweep_interval_rejected() {
    let err = AppConfig::from_toml("[action_plans]\ndeferred_sweep_interval_ms = 0\n").unwrap_err();
    assert!(format!("{err:#}").contains("扫描间隔"));

    let config = AppConfig::from_toml("[action_plans]\ndeferred_sweep_interval_ms = 250\n").unwrap();
    assert_eq!(config.action_plans.deferred_sweep_interval_ms, 250);
}

#[test]
fn test_invalid_storage_backend() {
    let mut config = AppConfig::default();
    config.storage.backend = "postgres".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_load_from_file() {
    let file = NamedTempFile::new().unwrap();
    fs::write(
        file.path(),
        r#"
[api]
bind_address = "127.0.0.1:8181"

[health]
default_timeout_ms = 2500
"#,
    )
    .unwrap();

    let config = AppConfig::load(file.path().to_str()).unwrap();
    assert_eq!(config.api.bind_address, "127.0.0.1:8181");
    assert_eq!(config.health.default_timeout_ms, 2500);
    assert_eq!(config.health.default_threshold, 3);
}

#[test]
fn test_load_missing_file_fails() {
    let result = AppConfig::load(Some("/nonexistent/automation.toml"));
    assert!(result.is_err());
}

#[test]
fn test_toml_roundtrip_keeps_sections() {
    let mut config = AppConfig::default();
    config.action_plans.max_retries = 7;
    let toml_str = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(parsed.action_plans.max_retries, 7);
}

#[test]
fn test_shipped_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/automation.toml");
    let content = fs::read_to_string(path).unwrap();
    let config = AppConfig::from_toml(&content).unwrap();

    assert_eq!(config.scheduler.classification, "keyword");
    assert_eq!(config.scheduler.seed_workers.len(), 1);
    assert!(config.remediation.enabled);
    assert_eq!(
        config.remediation.templates.get("disk").map(String::as_str),
        Some("system-check")
    );
}
