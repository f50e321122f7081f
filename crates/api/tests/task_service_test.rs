use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cronlease_api::{types::UpdateTaskRequest, TaskService};
use cronlease_core::{SchedulerError, SchedulerResult};
use cronlease_domain::{
    repositories::TaskRepository, ScheduleSnapshot, Task, TaskFilter, TaskStatus,
    TaskStatusUpdate,
};
use cronlease_testing_utils::{InMemoryTaskRepository, TaskBuilder, TestEnv};
use serde_json::json;
use uuid::Uuid;

/// 在每次条件更新之前模拟调度循环写入一次执行结果
struct RacingRepository {
    inner: InMemoryTaskRepository,
    races_left: AtomicUsize,
    next_execution: DateTime<Utc>,
}

impl RacingRepository {
    fn new(inner: InMemoryTaskRepository, races: usize, next_execution: DateTime<Utc>) -> Self {
        Self {
            inner,
            races_left: AtomicUsize::new(races),
            next_execution,
        }
    }
}

#[async_trait]
impl TaskRepository for RacingRepository {
    async fn create(&self, task: &Task) -> SchedulerResult<Task> {
        self.inner.create(task).await
    }

    async fn read_task(&self, id: Uuid) -> SchedulerResult<Option<Task>> {
        self.inner.read_task(id).await
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        self.inner.list(filter).await
    }

    async fn update(&self, task: &Task, observed: &ScheduleSnapshot) -> SchedulerResult<Task> {
        let remaining = self.races_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.races_left.store(remaining - 1, Ordering::SeqCst);
            let next = self.next_execution + Duration::days(remaining as i64);
            self.inner
                .write_task_status(task.id, &TaskStatusUpdate::executed(Some(next)))
                .await?;
        }
        self.inner.update(task, observed).await
    }

    async fn delete(&self, id: Uuid) -> SchedulerResult<bool> {
        self.inner.delete(id).await
    }

    async fn find_due_unlocked(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> SchedulerResult<Vec<Task>> {
        self.inner.find_due_unlocked(now, lookahead).await
    }

    async fn lock_tasks(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
        lease_duration: Duration,
    ) -> SchedulerResult<Vec<Uuid>> {
        self.inner.lock_tasks(ids, now, lease_duration).await
    }

    async fn claim_due_tasks(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
        lease_duration: Duration,
    ) -> SchedulerResult<Vec<Task>> {
        self.inner
            .claim_due_tasks(now, lookahead, lease_duration)
            .await
    }

    async fn write_task_status(&self, id: Uuid, update: &TaskStatusUpdate) -> SchedulerResult<()> {
        self.inner.write_task_status(id, update).await
    }
}

fn rename_request(name: &str) -> UpdateTaskRequest {
    serde_json::from_value(json!({ "name": name })).unwrap()
}

#[tokio::test]
async fn test_update_keeps_execution_result_written_concurrently() {
    let now = TestEnv::fixed_now();
    let task = TaskBuilder::new()
        .recurring("0 0 * * *")
        .with_status(TaskStatus::Processing)
        .with_next_execution(Some(now))
        .build();
    let inner = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let next = now + Duration::days(1);
    let service = TaskService::new(Arc::new(RacingRepository::new(inner.clone(), 1, next)));

    let updated = service
        .update_task(task.id, rename_request("renamed"))
        .await
        .unwrap();

    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.status, TaskStatus::Executed);
    assert_eq!(updated.next_execution_date, Some(next + Duration::days(1)));

    let stored = inner.get(task.id).unwrap();
    assert_eq!(stored.name, "renamed");
    assert_eq!(stored.status, TaskStatus::Executed);
}

#[tokio::test]
async fn test_update_gives_up_after_repeated_conflicts() {
    let now = TestEnv::fixed_now();
    let task = TaskBuilder::new()
        .recurring("0 0 * * *")
        .with_next_execution(Some(now))
        .build();
    let inner = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let service = TaskService::new(Arc::new(RacingRepository::new(inner.clone(), 10, now)));

    let err = service
        .update_task(task.id, rename_request("renamed"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ConcurrentModification { id } if id == task.id));

    let stored = inner.get(task.id).unwrap();
    assert_eq!(stored.name, task.name);
    assert_eq!(stored.status, TaskStatus::Executed);
}
