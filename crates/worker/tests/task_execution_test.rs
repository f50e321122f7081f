use std::sync::Arc;

use chrono::{Duration, Utc};
use cronlease_core::SchedulerError;
use cronlease_domain::{
    TaskExecutionRequest, TaskExecutionResponse, TaskStatus, TaskStatusUpdate,
};
use cronlease_testing_utils::{InMemoryTaskRepository, MockTaskExecutor, TaskBuilder};
use cronlease_worker::{run_worker_process, SimulatedExecutor, TaskWorker};

fn worker_with(repo: &InMemoryTaskRepository, executor: MockTaskExecutor) -> TaskWorker {
    TaskWorker::new(Arc::new(repo.clone()), Arc::new(executor))
}

#[tokio::test]
async fn test_recurring_success_sets_next_after_completion() {
    let now = Utc::now();
    let task = TaskBuilder::new()
        .recurring("*/5 * * * *")
        .with_next_execution(Some(now))
        .with_lease(now, Duration::seconds(10))
        .build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let executor = MockTaskExecutor::succeeding();
    let worker = worker_with(&repo, executor.clone());

    let response = worker.handle(TaskExecutionRequest::new(task.clone())).await;

    assert_eq!(response, TaskExecutionResponse::success(task.id));
    assert_eq!(executor.execution_count(), 1);

    let stored = repo.get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Executed);
    assert!(stored.locked_at.is_none() && stored.lock_expires.is_none());
    let next = stored.next_execution_date.unwrap();
    assert!(next > now);
    assert!(next <= now + Duration::minutes(5) + Duration::seconds(1));

    let writes: Vec<_> = repo.status_writes().into_iter().map(|(_, w)| w.status).collect();
    assert_eq!(writes, vec![TaskStatus::Processing, TaskStatus::Executed]);
}

#[tokio::test]
async fn test_one_time_success_clears_next_execution() {
    let now = Utc::now();
    let task = TaskBuilder::new()
        .one_time_at(now)
        .with_lease(now, Duration::seconds(10))
        .build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let worker = worker_with(&repo, MockTaskExecutor::succeeding());

    let response = worker.handle(TaskExecutionRequest::new(task.clone())).await;
    assert!(response.success);

    let stored = repo.get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Executed);
    assert!(stored.next_execution_date.is_none());
    assert!(stored.locked_at.is_none());
}

#[tokio::test]
async fn test_body_failure_reports_without_final_state() {
    let now = Utc::now();
    let task = TaskBuilder::new()
        .recurring("*/5 * * * *")
        .with_next_execution(Some(now))
        .with_lease(now, Duration::seconds(10))
        .build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let worker = worker_with(&repo, MockTaskExecutor::failing("boom"));

    let response = worker.handle(TaskExecutionRequest::new(task.clone())).await;

    assert!(!response.success);
    assert_eq!(response.task_id, task.id);
    assert!(response.error.as_deref().unwrap().contains("boom"));

    let stored = repo.get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Processing);
    assert_eq!(stored.next_execution_date, Some(now));
    assert!(stored.locked_at.is_some());
    assert_eq!(repo.status_writes().len(), 1);
}

#[tokio::test]
async fn test_store_failure_is_reported() {
    let task = TaskBuilder::new().build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    repo.set_unavailable(true);
    let executor = MockTaskExecutor::succeeding();
    let worker = worker_with(&repo, executor.clone());

    let response = worker.handle(TaskExecutionRequest::new(task.clone())).await;

    assert!(!response.success);
    assert_eq!(executor.execution_count(), 0);
}

#[tokio::test]
async fn test_invalid_recurrence_is_reported_as_failure() {
    let task = TaskBuilder::new().recurring("not a cron").build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let worker = worker_with(&repo, MockTaskExecutor::succeeding());

    let response = worker.handle(TaskExecutionRequest::new(task.clone())).await;

    assert!(!response.success);
    assert_eq!(repo.get(task.id).unwrap().status, TaskStatus::Processing);
}

#[tokio::test]
async fn test_process_entry_reads_one_line_and_writes_one_line() {
    let task = TaskBuilder::new().build();
    let repo = InMemoryTaskRepository::with_tasks(vec![task.clone()]);
    let worker = TaskWorker::new(
        Arc::new(repo.clone()),
        Arc::new(SimulatedExecutor::new(std::time::Duration::from_millis(5))),
    );

    let input = format!(
        "{}\n",
        serde_json::to_string(&TaskExecutionRequest::new(task.clone())).unwrap()
    );
    let mut output = Vec::new();
    run_worker_process(&worker, input.as_bytes(), &mut output)
        .await
        .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert_eq!(text.lines().count(), 1);
    let response: TaskExecutionResponse = serde_json::from_str(text.trim()).unwrap();
    assert_eq!(response, TaskExecutionResponse::success(task.id));
    assert_eq!(
        repo.status_writes().last().map(|(_, w)| w.clone()),
        Some(TaskStatusUpdate::executed(None))
    );
}

#[tokio::test]
async fn test_process_entry_rejects_closed_or_garbled_input() {
    let repo = InMemoryTaskRepository::new();
    let worker = worker_with(&repo, MockTaskExecutor::succeeding());

    let mut output = Vec::new();
    let err = run_worker_process(&worker, &b""[..], &mut output)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::WorkerFault(_)));

    let err = run_worker_process(&worker, &b"{not json}\n"[..], &mut output)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Serialization(_)));
    assert!(output.is_empty());
}
