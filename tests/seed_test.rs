use chrono::{TimeZone, Utc};
use cronlease::seed::seed_sample_tasks;
use cronlease_domain::{ScheduleType, TaskStatus};
use cronlease_testing_utils::{InMemoryTaskRepository, TaskBuilder, TestEnv};

#[tokio::test]
async fn test_seed_creates_sample_tasks() {
    let repo = InMemoryTaskRepository::new();
    let now = TestEnv::fixed_now();

    let tasks = seed_sample_tasks(&repo, false, now).await.unwrap();
    assert_eq!(tasks.len(), 2);

    let one_time = &tasks[0];
    assert_eq!(one_time.name, "Sample Test 1");
    assert_eq!(one_time.status, TaskStatus::Scheduled);
    assert_eq!(one_time.schedule_type, ScheduleType::OneTime);
    assert_eq!(
        one_time.next_execution_date,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
    );

    let recurring = &tasks[1];
    assert_eq!(recurring.status, TaskStatus::Executed);
    assert_eq!(recurring.schedule_value, "0 0 * * *");
    assert_eq!(
        recurring.next_execution_date,
        Some(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap())
    );
    assert_eq!(recurring.notification_emails.len(), 2);

    assert_eq!(repo.count(), 2);
}

#[tokio::test]
async fn test_seed_reset_clears_existing_tasks() {
    let existing = TaskBuilder::new().with_name("old").build();
    let repo = InMemoryTaskRepository::with_tasks(vec![existing.clone()]);

    seed_sample_tasks(&repo, false, TestEnv::fixed_now())
        .await
        .unwrap();
    assert_eq!(repo.count(), 3);

    seed_sample_tasks(&repo, true, TestEnv::fixed_now())
        .await
        .unwrap();
    assert_eq!(repo.count(), 2);
    assert!(repo.get(existing.id).is_none());
}
