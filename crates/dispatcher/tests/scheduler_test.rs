use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use cronlease_core::SchedulerError;
use cronlease_dispatcher::{InProcessLauncher, LeaseManager, SchedulerLoop, TaskDispatcher};
use cronlease_domain::{ports::TaskExecutor, TaskStatus};
use cronlease_testing_utils::{InMemoryTaskRepository, MockTaskExecutor, TaskBuilder, TestEnv};
use cronlease_worker::TaskWorker;

const LEASE_SECONDS: i64 = 10;

fn build_loop(
    repo: &InMemoryTaskRepository,
    executor: Arc<dyn TaskExecutor>,
    poll_interval: StdDuration,
) -> Arc<SchedulerLoop> {
    let repository = Arc::new(repo.clone());
    let worker = Arc::new(TaskWorker::new(repository.clone(), executor));
    let launcher = Arc::new(InProcessLauncher::new(worker));
    let dispatcher = Arc::new(TaskDispatcher::new(repository.clone(), launcher));
    let lease_manager = Arc::new(LeaseManager::new(
        repository,
        Duration::seconds(10),
        Duration::seconds(LEASE_SECONDS),
    ));
    Arc::new(SchedulerLoop::new(lease_manager, dispatcher, poll_interval))
}

async fn wait_for_status(repo: &InMemoryTaskRepository, id: uuid::Uuid, status: TaskStatus) -> bool {
    TestEnv::wait_for(
        || {
            let repo = repo.clone();
            async move { repo.get(id).is_some_and(|t| t.status == status) }
        },
        StdDuration::from_secs(5),
    )
    .await
}

#[tokio::test]
async fn test_one_time_task_executes_and_is_never_claimed_again() {
    let now = Utc::now();
    let task = TaskBuilder::new().one_time_at(now).build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let scheduler = build_loop(
        &repo,
        Arc::new(MockTaskExecutor::succeeding()),
        StdDuration::from_secs(60),
    );

    let claimed = scheduler.tick_once(now).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, task.id);

    assert!(wait_for_status(&repo, task.id, TaskStatus::Executed).await);
    let stored = repo.get(task.id).unwrap();
    assert!(stored.next_execution_date.is_none());
    assert!(stored.locked_at.is_none() && stored.lock_expires.is_none());

    let later = now + Duration::days(365);
    assert!(scheduler.tick_once(later).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recurring_failure_marks_failed_and_keeps_next_execution() {
    let now = Utc::now();
    let task = TaskBuilder::new()
        .recurring("*/5 * * * *")
        .with_next_execution(Some(now))
        .build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let scheduler = build_loop(
        &repo,
        Arc::new(MockTaskExecutor::failing("boom")),
        StdDuration::from_secs(60),
    );

    scheduler.tick_once(now).await.unwrap();

    assert!(wait_for_status(&repo, task.id, TaskStatus::Failed).await);
    let stored = repo.get(task.id).unwrap();
    assert_eq!(stored.next_execution_date, Some(now));
    assert!(stored.locked_at.is_none() && stored.lock_expires.is_none());

    // 失败的任务不会被后续轮询自动重试
    for offset in [5, 60, 3600] {
        let claimed = scheduler
            .tick_once(now + Duration::seconds(offset))
            .await
            .unwrap();
        assert!(claimed.is_empty(), "failed task claimed again at +{offset}s");
    }
    assert_eq!(repo.get(task.id).unwrap().status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_silent_worker_task_is_reclaimed_after_lease_expiry() {
    let t = Utc::now();
    let task = TaskBuilder::new().one_time_at(t).build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let executor = MockTaskExecutor::hanging();
    let scheduler = build_loop(&repo, Arc::new(executor.clone()), StdDuration::from_secs(60));

    assert_eq!(scheduler.tick_once(t).await.unwrap().len(), 1);
    assert!(wait_for_status(&repo, task.id, TaskStatus::Processing).await);

    // 租约未到期时不会被重复认领
    assert!(scheduler
        .tick_once(t + Duration::seconds(5))
        .await
        .unwrap()
        .is_empty());

    let reclaimed = scheduler
        .tick_once(t + Duration::seconds(LEASE_SECONDS + 1))
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, task.id);

    let stored = repo.get(task.id).unwrap();
    assert_eq!(
        stored.lock_expires,
        Some(t + Duration::seconds(2 * LEASE_SECONDS + 1))
    );
}

#[tokio::test]
async fn test_concurrent_ticks_claim_each_task_once() {
    let now = Utc::now();
    let tasks: Vec<_> = (0..10)
        .map(|i| {
            TaskBuilder::new()
                .with_name(&format!("task-{i}"))
                .one_time_at(now)
                .build()
        })
        .collect();
    let repo = InMemoryTaskRepository::with_tasks(tasks);
    let scheduler = build_loop(
        &repo,
        Arc::new(MockTaskExecutor::hanging()),
        StdDuration::from_secs(60),
    );

    let (first, second) = tokio::join!(scheduler.tick_once(now), scheduler.tick_once(now));
    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.len() + second.len(), 10);

    let mut ids: Vec<_> = first.iter().chain(second.iter()).map(|t| t.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn test_tick_propagates_store_errors() {
    let repo = InMemoryTaskRepository::new();
    repo.set_unavailable(true);
    let scheduler = build_loop(
        &repo,
        Arc::new(MockTaskExecutor::succeeding()),
        StdDuration::from_secs(60),
    );

    let err = scheduler.tick_once(Utc::now()).await.unwrap_err();
    assert!(matches!(err, SchedulerError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_loop_survives_failing_ticks_and_stop_is_idempotent() {
    let task = TaskBuilder::new().one_time_at(Utc::now()).build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    repo.set_unavailable(true);
    let scheduler = build_loop(
        &repo,
        Arc::new(MockTaskExecutor::succeeding()),
        StdDuration::from_millis(20),
    );

    assert!(scheduler.start());
    assert!(!scheduler.start());
    assert!(scheduler.is_running());

    tokio::time::sleep(StdDuration::from_millis(100)).await;
    assert_eq!(repo.get(task.id).unwrap().status, TaskStatus::Scheduled);

    repo.set_unavailable(false);
    assert!(wait_for_status(&repo, task.id, TaskStatus::Executed).await);

    scheduler.stop();
    scheduler.stop();
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_stop_does_not_wait_for_in_flight_workers() {
    let task = TaskBuilder::new().one_time_at(Utc::now()).build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let executor = MockTaskExecutor::hanging();
    let scheduler = build_loop(&repo, Arc::new(executor.clone()), StdDuration::from_millis(20));

    scheduler.start();
    assert!(wait_for_status(&repo, task.id, TaskStatus::Processing).await);

    let stopped = tokio::time::timeout(StdDuration::from_millis(100), async {
        scheduler.stop();
    })
    .await;
    assert!(stopped.is_ok());
    assert_eq!(scheduler.dispatcher().in_flight(), 1);

    // 停止后可以重新启动
    assert!(scheduler.start());
    scheduler.stop();
}
