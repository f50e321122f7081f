use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use cronlease_core::{SchedulerError, SchedulerResult};
use cronlease_dispatcher::{DispatchOutcome, InProcessLauncher, TaskDispatcher, WorkerLauncher};
use cronlease_domain::{TaskExecutionRequest, TaskExecutionResponse, TaskStatus};
use cronlease_testing_utils::{InMemoryTaskRepository, MockTaskExecutor, TaskBuilder};
use cronlease_worker::TaskWorker;
use uuid::Uuid;

/// 返回预设响应的启动器
struct ScriptedLauncher {
    result: fn(Uuid) -> SchedulerResult<TaskExecutionResponse>,
}

#[async_trait]
impl WorkerLauncher for ScriptedLauncher {
    fn isolation(&self) -> &'static str {
        "scripted"
    }

    async fn execute(&self, request: TaskExecutionRequest) -> SchedulerResult<TaskExecutionResponse> {
        (self.result)(request.task.id)
    }
}

fn in_process(repo: &InMemoryTaskRepository, executor: MockTaskExecutor) -> TaskDispatcher {
    let repository = Arc::new(repo.clone());
    let worker = Arc::new(TaskWorker::new(repository.clone(), Arc::new(executor)));
    TaskDispatcher::new(repository, Arc::new(InProcessLauncher::new(worker)))
}

fn leased_task() -> cronlease_domain::Task {
    let now = Utc::now();
    TaskBuilder::new()
        .recurring("*/5 * * * *")
        .with_next_execution(Some(now))
        .with_lease(now, Duration::seconds(10))
        .build()
}

#[tokio::test]
async fn test_success_only_terminates_worker() {
    let task = leased_task();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let dispatcher = in_process(&repo, MockTaskExecutor::succeeding());

    let outcome = dispatcher.run_to_completion(task.clone()).await;

    assert_eq!(outcome, DispatchOutcome::Succeeded);
    let statuses: Vec<_> = repo.status_writes().iter().map(|(_, w)| w.status).collect();
    assert_eq!(statuses, vec![TaskStatus::Processing, TaskStatus::Executed]);
}

#[tokio::test]
async fn test_reported_failure_marks_failed() {
    let task = leased_task();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let dispatcher = TaskDispatcher::new(
        Arc::new(repo.clone()),
        Arc::new(ScriptedLauncher {
            result: |id| Ok(TaskExecutionResponse::failure(id, "boom")),
        }),
    );

    let outcome = dispatcher.run_to_completion(task.clone()).await;

    assert_eq!(outcome, DispatchOutcome::Failed("boom".to_string()));
    let stored = repo.get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.locked_at.is_none() && stored.lock_expires.is_none());
    assert_eq!(stored.next_execution_date, task.next_execution_date);
}

#[tokio::test]
async fn test_worker_panic_is_a_fault() {
    let task = leased_task();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let dispatcher = in_process(&repo, MockTaskExecutor::panicking("worker exploded"));

    let outcome = dispatcher.run_to_completion(task.clone()).await;

    match outcome {
        DispatchOutcome::Faulted(reason) => assert!(reason.contains("worker exploded")),
        other => panic!("expected fault, got {other:?}"),
    }
    let stored = repo.get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.locked_at.is_none());
}

#[tokio::test]
async fn test_launcher_error_and_mismatched_response_are_faults() {
    let task = leased_task();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);

    let dispatcher = TaskDispatcher::new(
        Arc::new(repo.clone()),
        Arc::new(ScriptedLauncher {
            result: |_| Err(SchedulerError::WorkerFault("spawn failed".to_string())),
        }),
    );
    assert_eq!(
        dispatcher.run_to_completion(task.clone()).await,
        DispatchOutcome::Faulted("spawn failed".to_string())
    );
    assert_eq!(repo.get(task.id).unwrap().status, TaskStatus::Failed);

    let dispatcher = TaskDispatcher::new(
        Arc::new(repo.clone()),
        Arc::new(ScriptedLauncher {
            result: |_| Ok(TaskExecutionResponse::success(Uuid::new_v4())),
        }),
    );
    assert!(matches!(
        dispatcher.run_to_completion(task.clone()).await,
        DispatchOutcome::Faulted(_)
    ));
}

#[tokio::test]
async fn test_dispatch_runs_in_background() {
    let task = leased_task();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let dispatcher = Arc::new(in_process(&repo, MockTaskExecutor::succeeding()));

    let handle = dispatcher.dispatch(task.clone());
    assert_eq!(handle.await.unwrap(), DispatchOutcome::Succeeded);
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(repo.get(task.id).unwrap().status, TaskStatus::Executed);
}
