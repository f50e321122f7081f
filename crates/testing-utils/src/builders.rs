//! Test data builders

use chrono::{DateTime, Duration, Utc};
use cronlease_domain::entities::{ScheduleType, Task, TaskStatus};
use uuid::Uuid;

use crate::helpers::TestEnv;

/// 构建测试任务，默认是一个已到期、未锁定的一次性任务
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = TestEnv::fixed_now();
        Self {
            task: Task {
                id: Uuid::new_v4(),
                name: "test_task".to_string(),
                status: TaskStatus::Scheduled,
                schedule_type: ScheduleType::OneTime,
                schedule_value: now.to_rfc3339(),
                next_execution_date: Some(now),
                locked_at: None,
                lock_expires: None,
                test_type: serde_json::json!("smoke"),
                experiment_type: serde_json::json!({"variant": "A"}),
                notification_emails: vec!["qa@example.com".to_string()],
                created_at: now - Duration::hours(1),
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    /// 一次性任务，执行时间同时作为下次执行时间
    pub fn one_time_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.schedule_type = ScheduleType::OneTime;
        self.task.schedule_value = at.to_rfc3339();
        self.task.next_execution_date = Some(at);
        self
    }

    pub fn recurring(mut self, cron_expr: &str) -> Self {
        self.task.schedule_type = ScheduleType::Recurring;
        self.task.schedule_value = cron_expr.to_string();
        self
    }

    pub fn with_next_execution(mut self, next: Option<DateTime<Utc>>) -> Self {
        self.task.next_execution_date = next;
        self
    }

    pub fn with_lease(mut self, locked_at: DateTime<Utc>, duration: Duration) -> Self {
        self.task.locked_at = Some(locked_at);
        self.task.lock_expires = Some(locked_at + duration);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
