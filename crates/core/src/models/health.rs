use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AutomationError, AutomationResult};

/// 探针配置，由基础设施层解析为具体的 `HealthProbe`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeSpec {
    /// HTTP GET，状态码匹配即为健康
    Http {
        url: String,
        #[serde(default)]
        expected_status: Option<u16>,
    },
    /// TCP连接成功即为健康
    Tcp { address: String },
    /// 固定结果，用于演示和占位
    Static { healthy: bool },
}

impl Default for ProbeSpec {
    fn default() -> Self {
        ProbeSpec::Static { healthy: true }
    }
}

/// 健康检查默认参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheckDefaults {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub threshold: u32,
}

impl Default for HealthCheckDefaults {
    fn default() -> Self {
        Self {
            interval_ms: 30_000, // 30秒
            timeout_ms: 10_000,  // 10秒
            threshold: 3,
        }
    }
}

/// 健康检查注册请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheckRegistration {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "type")]
    pub check_type: String,
    #[serde(default, alias = "interval")]
    pub interval_ms: Option<u64>,
    #[serde(default, alias = "timeout")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub threshold: Option<u32>,
    #[serde(default)]
    pub probe: ProbeSpec,
}

impl HealthCheckRegistration {
    pub fn new(id: &str, name: &str, check_type: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            check_type: check_type.to_string(),
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = Some(interval_ms);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_probe(mut self, probe: ProbeSpec) -> Self {
        self.probe = probe;
        self
    }
}

/// 健康检查
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub id: String,
    pub name: String,
    pub check_type: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub threshold: u32,
    pub probe: ProbeSpec,
    pub consecutive_failures: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_runs: u64,
    pub total_failures: u64,
    pub registered_at: DateTime<Utc>,
}

impl HealthCheck {
    /// 校验注册请求并填充默认值
    pub fn from_registration(
        registration: HealthCheckRegistration,
        defaults: &HealthCheckDefaults,
    ) -> AutomationResult<Self> {
        for (field, value) in [
            ("id", &registration.id),
            ("name", &registration.name),
            ("type", &registration.check_type),
        ] {
            if value.trim().is_empty() {
                return Err(AutomationError::missing_field(field));
            }
        }

        let interval_ms = registration.interval_ms.unwrap_or(defaults.interval_ms);
        let timeout_ms = registration.timeout_ms.unwrap_or(defaults.timeout_ms);
        let threshold = registration.threshold.unwrap_or(defaults.threshold);
        if interval_ms == 0 || timeout_ms == 0 {
            return Err(AutomationError::Validation(
                "检查间隔和超时时间必须大于0".to_string(),
            ));
        }
        if threshold == 0 {
            return Err(AutomationError::Validation(
                "失败阈值必须大于0".to_string(),
            ));
        }

        Ok(Self {
            id: registration.id,
            name: registration.name,
            check_type: registration.check_type,
            interval_ms,
            timeout_ms,
            threshold,
            probe: registration.probe,
            consecutive_failures: 0,
            last_check: None,
            last_success: None,
            last_error: None,
            total_runs: 0,
            total_failures: 0,
            registered_at: Utc::now(),
        })
    }
}

/// 故障严重程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Critical,
    High,
    Medium,
}

impl IncidentSeverity {
    /// 根据检查类型推断严重程度
    pub fn for_check_type(check_type: &str) -> Self {
        match check_type.to_ascii_lowercase().as_str() {
            "server" | "database" => IncidentSeverity::Critical,
            "memory" | "disk" => IncidentSeverity::High,
            _ => IncidentSeverity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentSeverity::Critical => "critical",
            IncidentSeverity::High => "high",
            IncidentSeverity::Medium => "medium",
        }
    }
}

impl fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedBy {
    Manual,
    Automatic,
}

/// 故障事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub health_check_id: String,
    pub check_name: String,
    pub check_type: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub description: String,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub resolved_by: Option<ResolvedBy>,
    pub remediation_plan_id: Option<String>,
    pub escalated: bool,
}

impl Incident {
    /// 为越过阈值的健康检查创建故障事件
    pub fn for_check(check: &HealthCheck) -> Self {
        let error = check.last_error.as_deref().unwrap_or("未知错误");
        Self {
            id: Uuid::new_v4().to_string(),
            health_check_id: check.id.clone(),
            check_name: check.name.clone(),
            check_type: check.check_type.clone(),
            severity: IncidentSeverity::for_check_type(&check.check_type),
            status: IncidentStatus::Open,
            description: format!("健康检查失败: {} - {}", check.name, error),
            consecutive_failures: check.consecutive_failures,
            last_error: check.last_error.clone(),
            detected_at: Utc::now(),
            resolved_at: None,
            resolution: None,
            resolved_by: None,
            remediation_plan_id: None,
            escalated: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == IncidentStatus::Open
    }

    /// 从发现到解决的耗时（毫秒）
    pub fn recovery_time_ms(&self) -> Option<i64> {
        self.resolved_at
            .map(|resolved| (resolved - self.detected_at).num_milliseconds())
    }
}

/// 故障事件查询过滤条件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub health_check_id: Option<String>,
    pub severity: Option<IncidentSeverity>,
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.status.map_or(true, |s| incident.status == s)
            && self
                .health_check_id
                .as_ref()
                .map_or(true, |id| &incident.health_check_id == id)
            && self.severity.map_or(true, |s| incident.severity == s)
    }
}

/// 故障事件统计
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IncidentStats {
    pub total: usize,
    pub active: usize,
    pub auto_resolved: usize,
    pub manual_resolved: usize,
    pub escalated: usize,
    pub average_recovery_time_ms: f64,
}

/// 单个健康检查的连续失败情况
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStreak {
    pub id: String,
    pub name: String,
    pub check_type: String,
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub last_error: Option<String>,
}

impl From<&HealthCheck> for CheckStreak {
    fn from(check: &HealthCheck) -> Self {
        Self {
            id: check.id.clone(),
            name: check.name.clone(),
            check_type: check.check_type.clone(),
            consecutive_failures: check.consecutive_failures,
            threshold: check.threshold,
            last_error: check.last_error.clone(),
        }
    }
}
