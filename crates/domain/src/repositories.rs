//! 领域仓储抽象
//!
//! 任务存储是调度器唯一的共享可变资源，任务之间的互斥完全依赖租约字段。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use cronlease_core::SchedulerResult;

use crate::entities::{ScheduleSnapshot, Task, TaskFilter, TaskStatusUpdate};

/// 任务仓储抽象
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> SchedulerResult<Task>;
    async fn read_task(&self, id: Uuid) -> SchedulerResult<Option<Task>>;
    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>>;

    /// 更新名称、状态、调度配置和载荷字段，不修改租约字段
    ///
    /// 仅当存储中的状态与下次执行时间仍等于 `observed` 时写入，
    /// 否则返回 `ConcurrentModification`；任务不存在时返回 `TaskNotFound`。
    async fn update(&self, task: &Task, observed: &ScheduleSnapshot) -> SchedulerResult<Task>;
    async fn delete(&self, id: Uuid) -> SchedulerResult<bool>;

    /// 查询 `next_execution_date <= now + lookahead` 且租约为空或已过期的任务
    async fn find_due_unlocked(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> SchedulerResult<Vec<Task>>;

    /// 对仍未被锁定（或租约已过期）的任务加锁，返回加锁成功的ID
    async fn lock_tasks(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
        lease_duration: Duration,
    ) -> SchedulerResult<Vec<Uuid>>;

    /// 在一个原子单元内完成查询与加锁，返回加锁前的任务快照
    async fn claim_due_tasks(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
        lease_duration: Duration,
    ) -> SchedulerResult<Vec<Task>>;

    /// 写入状态转换，任务不存在时返回 `TaskNotFound`
    async fn write_task_status(&self, id: Uuid, update: &TaskStatusUpdate) -> SchedulerResult<()>;
}
