use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cronlease_core::SchedulerError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Scheduler(SchedulerError::TaskNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "TASK_NOT_FOUND")
            }
            ApiError::Scheduler(SchedulerError::InvalidSchedule { .. }) => {
                (StatusCode::BAD_REQUEST, "INVALID_SCHEDULE")
            }
            ApiError::Scheduler(SchedulerError::InvalidTaskParams(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_TASK_PARAMS")
            }
            ApiError::Scheduler(SchedulerError::StoreUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            ApiError::Scheduler(SchedulerError::ConcurrentModification { .. }) => {
                (StatusCode::CONFLICT, "CONCURRENT_MODIFICATION")
            }
            ApiError::Scheduler(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Scheduler(SchedulerError::TaskNotFound { id }) => {
                format!("任务 ID {} 不存在", id)
            }
            ApiError::Scheduler(
                err @ (SchedulerError::InvalidSchedule { .. } | SchedulerError::InvalidTaskParams(_)),
            ) => err.to_string(),
            ApiError::Scheduler(SchedulerError::StoreUnavailable(_)) => {
                "任务存储暂不可用".to_string()
            }
            ApiError::Scheduler(err @ SchedulerError::ConcurrentModification { .. }) => {
                err.to_string()
            }
            // 内部错误细节只写日志
            ApiError::Scheduler(_) | ApiError::Internal(_) => "系统内部错误".to_string(),
            ApiError::BadRequest(msg) => format!("请求参数错误: {}", msg),
            ApiError::NotFound => "请求的资源不存在".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": self.message(),
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_task_not_found_maps_to_404() {
        let error: ApiError = SchedulerError::TaskNotFound { id: Uuid::new_v4() }.into();
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_schedule_maps_to_400() {
        let error: ApiError = SchedulerError::invalid_schedule("bad", "parse").into();
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_concurrent_modification_maps_to_409() {
        let error: ApiError = SchedulerError::ConcurrentModification { id: Uuid::new_v4() }.into();
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_store_errors_hide_details() {
        let error: ApiError = SchedulerError::Internal("secret detail".to_string()).into();
        assert_eq!(error.message(), "系统内部错误");
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let error: ApiError = SchedulerError::StoreUnavailable("pool closed".to_string()).into();
        assert_eq!(
            error.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
