use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use collector_core::SchedulerError;
use tracing::{error, warn};

use crate::response::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(err) => match err {
                SchedulerError::TaskNotFound { .. }
                | SchedulerError::ScheduleNotFound { .. }
                | SchedulerError::RuleNotFound { .. }
                | SchedulerError::InstanceNotFound { .. }
                | SchedulerError::AssetNotFound { .. } => StatusCode::NOT_FOUND,
                SchedulerError::PoolSaturated { .. } => StatusCode::SERVICE_UNAVAILABLE,
                SchedulerError::DuplicateTaskCode { .. }
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::InvalidSchedule(_)
                | SchedulerError::InvalidRule(_)
                | SchedulerError::Configuration(_)
                | SchedulerError::CollectorNotFound { .. }
                | SchedulerError::TaskDisabled { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(error = %self, "请求处理失败");
            format!("系统内部错误: {self}")
        } else {
            warn!(status = status.as_u16(), error = %self, "请求被拒绝");
            self.to_string()
        };

        (status, ApiResponse::error(message)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
