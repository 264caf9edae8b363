use thiserror::Error;

/// 错误分类，决定上层如何报告以及是否值得重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 输入缺失或格式错误
    Validation,
    /// 引用的实体不存在
    Lookup,
    /// 与当前状态冲突
    Conflict,
    /// 暂时性故障，记录但不作为硬失败
    Transient,
    /// 重试次数耗尽，需要人工介入
    Exhaustion,
    /// 内部错误
    Internal,
}

/// 自动化引擎错误类型定义
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("无效的任务: {0}")]
    InvalidTask(String),

    #[error("Worker已存在: {id}")]
    DuplicateWorker { id: String },

    #[error("Worker未找到: {id}")]
    UnknownWorker { id: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("任务 {id} 当前状态为 {status}，无法执行 {operation}")]
    InvalidTaskState {
        id: String,
        status: String,
        operation: String,
    },

    #[error("等待任务 {id} 超时 ({timeout_ms}ms)")]
    TaskTimeout { id: String, timeout_ms: u64 },

    #[error("行动计划模板未找到: {id}")]
    TemplateNotFound { id: String },

    #[error("行动计划未找到: {id}")]
    PlanNotFound { id: String },

    #[error("行动计划 {id} 当前状态为 {status}，无法执行 {operation}")]
    InvalidPlanState {
        id: String,
        status: String,
        operation: String,
    },

    #[error("行动计划 {id} 重试次数超过上限 {max}")]
    RetryLimitExceeded { id: String, max: u32 },

    #[error("步骤 {step_id} 执行失败: {message}")]
    StepExecution { step_id: String, message: String },

    #[error("健康检查未找到: {id}")]
    HealthCheckNotFound { id: String },

    #[error("健康检查已存在: {id}")]
    DuplicateHealthCheck { id: String },

    #[error("健康检查 {id} 超时 ({timeout_ms}ms)")]
    HealthCheckTimeout { id: String, timeout_ms: u64 },

    #[error("故障事件未找到: {id}")]
    IncidentNotFound { id: String },

    #[error("故障事件已解决: {id}")]
    AlreadyResolved { id: String },

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl AutomationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutomationError::Validation(_) | AutomationError::InvalidTask(_) => {
                ErrorKind::Validation
            }
            AutomationError::UnknownWorker { .. }
            | AutomationError::TaskNotFound { .. }
            | AutomationError::TemplateNotFound { .. }
            | AutomationError::PlanNotFound { .. }
            | AutomationError::HealthCheckNotFound { .. }
            | AutomationError::IncidentNotFound { .. } => ErrorKind::Lookup,
            AutomationError::DuplicateWorker { .. }
            | AutomationError::DuplicateHealthCheck { .. }
            | AutomationError::AlreadyResolved { .. }
            | AutomationError::InvalidTaskState { .. }
            | AutomationError::InvalidPlanState { .. } => ErrorKind::Conflict,
            AutomationError::TaskTimeout { .. }
            | AutomationError::HealthCheckTimeout { .. }
            | AutomationError::StepExecution { .. } => ErrorKind::Transient,
            AutomationError::RetryLimitExceeded { .. } => ErrorKind::Exhaustion,
            AutomationError::Storage(_)
            | AutomationError::Serialization(_)
            | AutomationError::Configuration(_)
            | AutomationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 便捷构造：缺少必填字段
    pub fn missing_field(field: &str) -> Self {
        AutomationError::Validation(format!("缺少必填字段: {field}"))
    }
}

/// 统一的Result类型
pub type AutomationResult<T> = std::result::Result<T, AutomationError>;
