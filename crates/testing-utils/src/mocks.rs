//! In-memory implementations for repository and executor traits
//!
//! 不依赖数据库即可驱动调度循环、Dispatcher 与 Worker。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cronlease_core::{SchedulerError, SchedulerResult};
use cronlease_domain::entities::{Lease, ScheduleSnapshot, Task, TaskFilter, TaskStatusUpdate};
use cronlease_domain::TaskStatus;
use cronlease_domain::ports::TaskExecutor;
use cronlease_domain::repositories::TaskRepository;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 内存任务仓储
///
/// 查询与加锁在同一个临界区内完成，认领语义与 SQLite 实现一致。
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<Mutex<HashMap<Uuid, Task>>>,
    status_writes: Arc<Mutex<Vec<(Uuid, TaskStatusUpdate)>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.tasks.lock().unwrap();
            for task in tasks {
                map.insert(task.id, task);
            }
        }
        repo
    }

    /// 模拟存储不可用，之后的所有操作都返回 `StoreUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    pub fn get_all_tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    /// 按写入顺序记录的状态写入
    pub fn status_writes(&self) -> Vec<(Uuid, TaskStatusUpdate)> {
        self.status_writes.lock().unwrap().clone()
    }

    fn check_available(&self) -> SchedulerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SchedulerError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn sorted_due(tasks: &HashMap<Uuid, Task>, now: DateTime<Utc>, lookahead: Duration) -> Vec<Task> {
        let mut due: Vec<Task> = tasks
            .values()
            .filter(|task| task.is_claimable(now, lookahead))
            .cloned()
            .collect();
        due.sort_by_key(|task| (task.next_execution_date, task.created_at));
        due
    }

    fn try_lock(task: &mut Task, lease: &Lease) -> bool {
        if task.status == TaskStatus::Failed || task.is_leased_at(lease.locked_at) {
            return false;
        }
        task.locked_at = Some(lease.locked_at);
        task.lock_expires = Some(lease.expires);
        true
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: &Task) -> SchedulerResult<Task> {
        self.check_available()?;
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn read_task(&self, id: Uuid) -> SchedulerResult<Option<Task>> {
        self.check_available()?;
        Ok(self.get(id))
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        self.check_available()?;
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        tasks.sort_by_key(|task| (task.created_at, task.id));
        if let Some(limit) = filter.limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    async fn update(&self, task: &Task, observed: &ScheduleSnapshot) -> SchedulerResult<Task> {
        self.check_available()?;
        let mut tasks = self.tasks.lock().unwrap();
        let existing = tasks
            .get_mut(&task.id)
            .ok_or(SchedulerError::TaskNotFound { id: task.id })?;
        if existing.schedule_snapshot() != *observed {
            return Err(SchedulerError::ConcurrentModification { id: task.id });
        }

        let locked_at = existing.locked_at;
        let lock_expires = existing.lock_expires;
        *existing = task.clone();
        existing.locked_at = locked_at;
        existing.lock_expires = lock_expires;
        Ok(existing.clone())
    }

    async fn delete(&self, id: Uuid) -> SchedulerResult<bool> {
        self.check_available()?;
        Ok(self.tasks.lock().unwrap().remove(&id).is_some())
    }

    async fn find_due_unlocked(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> SchedulerResult<Vec<Task>> {
        self.check_available()?;
        let tasks = self.tasks.lock().unwrap();
        Ok(Self::sorted_due(&tasks, now, lookahead))
    }

    async fn lock_tasks(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
        lease_duration: Duration,
    ) -> SchedulerResult<Vec<Uuid>> {
        self.check_available()?;
        let lease = Lease::new(now, lease_duration);
        let mut tasks = self.tasks.lock().unwrap();
        Ok(ids
            .iter()
            .filter(|id| {
                tasks
                    .get_mut(*id)
                    .is_some_and(|task| Self::try_lock(task, &lease))
            })
            .copied()
            .collect())
    }

    async fn claim_due_tasks(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
        lease_duration: Duration,
    ) -> SchedulerResult<Vec<Task>> {
        self.check_available()?;
        let lease = Lease::new(now, lease_duration);
        let mut tasks = self.tasks.lock().unwrap();
        let due = Self::sorted_due(&tasks, now, lookahead);

        let mut claimed = Vec::with_capacity(due.len());
        for snapshot in due {
            if let Some(task) = tasks.get_mut(&snapshot.id) {
                if Self::try_lock(task, &lease) {
                    claimed.push(snapshot);
                }
            }
        }
        Ok(claimed)
    }

    async fn write_task_status(&self, id: Uuid, update: &TaskStatusUpdate) -> SchedulerResult<()> {
        self.check_available()?;
        {
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks
                .get_mut(&id)
                .ok_or(SchedulerError::TaskNotFound { id })?;
            update.apply_to(task);
        }
        self.status_writes.lock().unwrap().push((id, update.clone()));
        Ok(())
    }
}

/// 可编排的执行器行为
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    Fail(String),
    Panic(String),
    /// 永不返回，用于模拟卡死的 Worker
    Hang,
    Delay(std::time::Duration),
}

/// 按预设行为执行任务并记录调用次数
#[derive(Debug, Clone)]
pub struct MockTaskExecutor {
    behavior: MockBehavior,
    executions: Arc<AtomicUsize>,
}

impl MockTaskExecutor {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(MockBehavior::Succeed)
    }

    pub fn failing(message: &str) -> Self {
        Self::new(MockBehavior::Fail(message.to_string()))
    }

    pub fn panicking(message: &str) -> Self {
        Self::new(MockBehavior::Panic(message.to_string()))
    }

    pub fn hanging() -> Self {
        Self::new(MockBehavior::Hang)
    }

    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for MockTaskExecutor {
    async fn execute(&self, _task: &Task) -> SchedulerResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::Fail(message) => Err(SchedulerError::TaskExecution(message.clone())),
            MockBehavior::Panic(message) => panic!("{}", message),
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            MockBehavior::Delay(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
