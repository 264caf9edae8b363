use automation_core::{AutomationError, ErrorKind};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Automation(#[from] AutomationError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("缺少或无效的API Key")]
    Unauthorized,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// 内部错误的原始信息，由中间件决定是否返回给调用方
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Automation(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Lookup => StatusCode::NOT_FOUND,
                ErrorKind::Conflict | ErrorKind::Exhaustion => StatusCode::CONFLICT,
                ErrorKind::Transient | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::Automation(err) => match err {
                AutomationError::Validation(_) => "VALIDATION_ERROR",
                AutomationError::InvalidTask(_) => "INVALID_TASK",
                AutomationError::DuplicateWorker { .. } => "DUPLICATE_WORKER",
                AutomationError::UnknownWorker { .. } => "WORKER_NOT_FOUND",
                AutomationError::TaskNotFound { .. } => "TASK_NOT_FOUND",
                AutomationError::InvalidTaskState { .. } => "INVALID_TASK_STATE",
                AutomationError::TemplateNotFound { .. } => "TEMPLATE_NOT_FOUND",
                AutomationError::PlanNotFound { .. } => "PLAN_NOT_FOUND",
                AutomationError::InvalidPlanState { .. } => "INVALID_PLAN_STATE",
                AutomationError::RetryLimitExceeded { .. } => "RETRY_LIMIT_EXCEEDED",
                AutomationError::HealthCheckNotFound { .. } => "HEALTH_CHECK_NOT_FOUND",
                AutomationError::DuplicateHealthCheck { .. } => "DUPLICATE_HEALTH_CHECK",
                AutomationError::IncidentNotFound { .. } => "INCIDENT_NOT_FOUND",
                AutomationError::AlreadyResolved { .. } => "INCIDENT_ALREADY_RESOLVED",
                _ => "INTERNAL_ERROR",
            },
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn suggestions(&self) -> Vec<&'static str> {
        match self {
            ApiError::Automation(AutomationError::UnknownWorker { .. }) => {
                vec!["使用 GET /api/workers 查看已注册的Worker"]
            }
            ApiError::Automation(AutomationError::TaskNotFound { .. }) => {
                vec!["使用 GET /api/tasks 查看所有任务"]
            }
            ApiError::Automation(AutomationError::TemplateNotFound { .. }) => {
                vec!["使用 GET /api/action-plans/templates 查看可用模板"]
            }
            ApiError::Automation(AutomationError::InvalidPlanState { .. }) => vec![
                "失败的行动计划请使用 POST /api/action-plans/{id}/retry",
                "使用 GET /api/action-plans/{id} 查看当前状态",
            ],
            ApiError::Automation(AutomationError::RetryLimitExceeded { .. }) => {
                vec!["重试次数已耗尽，请人工排查后重新创建行动计划"]
            }
            ApiError::Automation(AutomationError::AlreadyResolved { .. }) => {
                vec!["使用 GET /api/incidents?status=open 查看未解决的故障事件"]
            }
            ApiError::Unauthorized => vec!["请在请求头中添加 x-api-key"],
            err if err.status() == StatusCode::BAD_REQUEST => {
                vec!["请检查请求格式和必填字段"]
            }
            err if err.status() == StatusCode::INTERNAL_SERVER_ERROR => vec![
                "系统遇到内部错误，请稍后重试",
                "查看 GET /health 检查系统状态",
            ],
            _ => Vec::new(),
        }
    }
}

/// 内部错误统一使用的响应体，`detail` 只在非生产环境下填充
pub fn internal_error_response(detail: Option<&str>) -> Response {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let mut error = json!({
        "type": "INTERNAL_ERROR",
        "code": status.as_u16(),
        "suggestions": ["系统遇到内部错误，请稍后重试", "查看 GET /health 检查系统状态"],
    });
    if let Some(detail) = detail {
        error["details"] = json!(detail);
    }
    let body = Json(json!({
        "success": false,
        "message": "系统内部错误",
        "error": error,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }));
    (status, body).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("请求处理失败: {}", self);
            let mut response = internal_error_response(None);
            response
                .extensions_mut()
                .insert(InternalErrorDetail(self.to_string()));
            return response;
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
            "error": {
                "type": self.error_type(),
                "code": status.as_u16(),
                "suggestions": self.suggestions(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_error_kind() {
        let cases = vec![
            (AutomationError::missing_field("type"), StatusCode::BAD_REQUEST),
            (
                AutomationError::PlanNotFound { id: "p1".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                AutomationError::AlreadyResolved { id: "i1".into() },
                StatusCode::CONFLICT,
            ),
            (
                AutomationError::RetryLimitExceeded {
                    id: "p1".into(),
                    max: 3,
                },
                StatusCode::CONFLICT,
            ),
            (
                AutomationError::Storage("磁盘已满".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_internal_error_carries_detail_extension() {
        let response = ApiError::Internal("连接池耗尽".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<InternalErrorDetail>().unwrap();
        assert!(detail.0.contains("连接池耗尽"));
    }

    #[test]
    fn test_unauthorized() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
