//! 仓储操作的错误处理
//!
//! 为数据库错误附加操作上下文并统一记录日志。

use std::fmt;

use cronlease_core::SchedulerError;
use sqlx::Error as SqlxError;
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Delete,
    Query,
    Claim,
    StatusWrite,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Query => write!(f, "批量查询"),
            RepositoryOperation::Claim => write!(f, "认领"),
            RepositoryOperation::StatusWrite => write!(f, "状态写入"),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// SQLite 忙/锁定错误码（含扩展码 SQLITE_BUSY_SNAPSHOT）
    const BUSY_CODES: [&'static str; 3] = ["5", "6", "517"];

    pub fn is_busy(err: &SqlxError) -> bool {
        match err {
            SqlxError::Database(db_err) => db_err
                .code()
                .is_some_and(|code| Self::BUSY_CODES.iter().any(|busy| &*code == *busy)),
            _ => false,
        }
    }

    pub fn database_error(
        operation: RepositoryOperation,
        task_id: Option<Uuid>,
        err: SqlxError,
    ) -> SchedulerError {
        match task_id {
            Some(id) => error!(task.id = %id, "任务{}失败: {}", operation, err),
            None => error!("任务{}失败: {}", operation, err),
        }
        SchedulerError::from_store(err)
    }

    /// 认领过程中出现写冲突时，不把它当作存储故障
    pub fn claim_error(err: SqlxError) -> SchedulerError {
        if Self::is_busy(&err) {
            warn!("任务认领遇到写冲突: {}", err);
            SchedulerError::ClaimConflict(err.to_string())
        } else {
            Self::database_error(RepositoryOperation::Claim, None, err)
        }
    }

    pub fn log_operation_success(operation: RepositoryOperation, description: &str) {
        debug!("{}{}成功", operation, description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_error_is_not_busy() {
        assert!(!RepositoryErrorHelpers::is_busy(&SqlxError::RowNotFound));
        assert!(matches!(
            RepositoryErrorHelpers::claim_error(SqlxError::PoolTimedOut),
            SchedulerError::StoreUnavailable(_)
        ));
    }
}
