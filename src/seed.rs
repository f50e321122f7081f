//! 示例数据

use chrono::{DateTime, Utc};
use cronlease_core::SchedulerResult;
use cronlease_domain::{
    repositories::TaskRepository, NewTask, ScheduleType, Task, TaskFilter, TaskStatus,
};
use serde_json::json;
use tracing::info;

/// 写入两个示例任务：一个一次性任务和一个已执行过的每日任务
///
/// `reset` 为真时先清空已有任务。
pub async fn seed_sample_tasks(
    repository: &dyn TaskRepository,
    reset: bool,
    now: DateTime<Utc>,
) -> SchedulerResult<Vec<Task>> {
    if reset {
        let existing = repository.list(&TaskFilter::default()).await?;
        for task in &existing {
            repository.delete(task.id).await?;
        }
        info!("已清空 {} 个任务", existing.len());
    }

    let one_time = Task::create(
        NewTask {
            name: "Sample Test 1".to_string(),
            schedule_type: ScheduleType::OneTime,
            schedule_value: "2024-03-01T10:00:00Z".to_string(),
            test_type: json!("Performance"),
            experiment_type: json!("Load Test"),
            notification_emails: vec!["test@example.com".to_string()],
        },
        now,
    )?;

    let mut recurring = Task::create(
        NewTask {
            name: "Sample Test 2".to_string(),
            schedule_type: ScheduleType::Recurring,
            schedule_value: "0 0 * * *".to_string(),
            test_type: json!("Integration"),
            experiment_type: json!("API Test"),
            notification_emails: vec![
                "dev@example.com".to_string(),
                "qa@example.com".to_string(),
            ],
        },
        now,
    )?;
    recurring.status = TaskStatus::Executed;

    let mut created = Vec::with_capacity(2);
    for task in [one_time, recurring] {
        created.push(repository.create(&task).await?);
    }

    info!("已创建 {} 个示例任务", created.len());
    Ok(created)
}
