use thiserror::Error;
use uuid::Uuid;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("任务存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: Uuid },

    #[error("无效的调度表达式: {expr} - {message}")]
    InvalidSchedule { expr: String, message: String },

    #[error("任务认领冲突: {0}")]
    ClaimConflict(String),

    #[error("任务已被并发修改: {id}")]
    ConcurrentModification { id: Uuid },

    #[error("Worker故障: {0}")]
    WorkerFault(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn invalid_schedule(expr: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulerError::InvalidSchedule {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// 将sqlx错误归类：连接层面的失败视为存储不可用
    pub fn from_store(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                SchedulerError::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => {
                SchedulerError::StoreUnavailable(err.to_string())
            }
            other => SchedulerError::Database(other),
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_store_unavailable() {
        let err = SchedulerError::from_store(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, SchedulerError::StoreUnavailable(_)));
    }

    #[test]
    fn test_row_not_found_stays_database_error() {
        let err = SchedulerError::from_store(sqlx::Error::RowNotFound);
        assert!(matches!(err, SchedulerError::Database(_)));
    }

    #[test]
    fn test_invalid_schedule_message() {
        let err = SchedulerError::invalid_schedule("* *", "字段数量错误");
        assert_eq!(err.to_string(), "无效的调度表达式: * * - 字段数量错误");
    }
}
