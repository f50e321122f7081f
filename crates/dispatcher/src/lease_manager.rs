use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cronlease_core::{config::models::SchedulerConfig, SchedulerResult};
use cronlease_domain::{repositories::TaskRepository, Task};
use cronlease_infrastructure::StructuredLogger;

/// 租约管理
///
/// 在存储的一个原子单元内查找到期且未锁定的任务并加锁。
/// 租约不续期，到期后任务可被任意一次轮询重新认领。
pub struct LeaseManager {
    repository: Arc<dyn TaskRepository>,
    lookahead: Duration,
    lease_duration: Duration,
}

impl LeaseManager {
    pub fn new(repository: Arc<dyn TaskRepository>, lookahead: Duration, lease_duration: Duration) -> Self {
        Self {
            repository,
            lookahead,
            lease_duration,
        }
    }

    pub fn from_config(repository: Arc<dyn TaskRepository>, config: &SchedulerConfig) -> Self {
        Self::new(repository, config.lookahead(), config.lease_duration())
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn lookahead(&self) -> Duration {
        self.lookahead
    }

    /// 认领到期任务，返回加锁前的快照
    pub async fn claim(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Task>> {
        let claimed = self
            .repository
            .claim_due_tasks(now, self.lookahead, self.lease_duration)
            .await?;

        let lease_expires = now + self.lease_duration;
        for task in &claimed {
            StructuredLogger::log_task_claimed(task, lease_expires);
        }
        Ok(claimed)
    }
}
