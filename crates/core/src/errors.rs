use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("采集任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("任务调度未找到: {id}")]
    ScheduleNotFound { id: i64 },

    #[error("采集规则未找到: {id}")]
    RuleNotFound { id: i64 },

    #[error("采集实例未找到: {id}")]
    InstanceNotFound { id: i64 },

    #[error("资产未找到: {id}")]
    AssetNotFound { id: i64 },

    #[error("任务编码已存在: {code}")]
    DuplicateTaskCode { code: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的调度配置: {0}")]
    InvalidSchedule(String),

    #[error("无效的规则配置: {0}")]
    InvalidRule(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("找不到适合的采集器: protocol={protocol}, asset_type={asset_type}")]
    CollectorNotFound {
        protocol: String,
        asset_type: String,
    },

    #[error("任务已禁用: {id}")]
    TaskDisabled { id: i64 },

    #[error("网络或IO错误: {0}")]
    TransientIo(String),

    #[error("指标采集错误: {0}")]
    MetricCollection(String),

    #[error("采集器执行异常: {0}")]
    CollectorPanicked(String),

    #[error("采集超时: {seconds}秒")]
    CollectTimeout { seconds: u64 },

    #[error("执行池已满，拒绝任务: {task_id}")]
    PoolSaturated { task_id: i64 },

    #[error("采集实例已结束，不允许再次修改: {id}")]
    InstanceAlreadyFinished { id: i64 },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误分类，决定错误如何呈现以及是否可以等待下一次调度恢复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 配置问题，立即失败且不重试
    Configuration,
    /// 超时或连接失败，只能依赖下一次调度恢复
    TransientIo,
    /// 单个指标失败
    PartialMetric,
    /// 持久化失败，仅记录日志
    Persistence,
    Internal,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "配置错误",
            ErrorKind::TransientIo => "临时IO错误",
            ErrorKind::PartialMetric => "指标错误",
            ErrorKind::Persistence => "持久化错误",
            ErrorKind::Internal => "内部错误",
        }
    }

    /// 只有临时IO错误在下一次调度时有望恢复
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientIo)
    }
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Database(_) | SchedulerError::DatabaseOperation(_) => {
                ErrorKind::Persistence
            }
            SchedulerError::TaskNotFound { .. }
            | SchedulerError::ScheduleNotFound { .. }
            | SchedulerError::RuleNotFound { .. }
            | SchedulerError::InstanceNotFound { .. }
            | SchedulerError::AssetNotFound { .. }
            | SchedulerError::DuplicateTaskCode { .. }
            | SchedulerError::InvalidCron { .. }
            | SchedulerError::InvalidSchedule(_)
            | SchedulerError::InvalidRule(_)
            | SchedulerError::Configuration(_)
            | SchedulerError::CollectorNotFound { .. }
            | SchedulerError::TaskDisabled { .. } => ErrorKind::Configuration,
            SchedulerError::TransientIo(_)
            | SchedulerError::CollectTimeout { .. }
            | SchedulerError::PoolSaturated { .. } => ErrorKind::TransientIo,
            SchedulerError::MetricCollection(_) => ErrorKind::PartialMetric,
            SchedulerError::CollectorPanicked(_)
            | SchedulerError::InstanceAlreadyFinished { .. }
            | SchedulerError::Serialization(_)
            | SchedulerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 写入采集实例的错误信息，带错误分类前缀
    pub fn instance_message(&self) -> String {
        format!("[{}] {}", self.kind().label(), self)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskNotFound { .. }
                | SchedulerError::ScheduleNotFound { .. }
                | SchedulerError::RuleNotFound { .. }
                | SchedulerError::InstanceNotFound { .. }
                | SchedulerError::AssetNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
