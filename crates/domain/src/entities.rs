use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cronlease_core::SchedulerResult;

use crate::recurrence::initial_next_execution;
use crate::value_objects::UpdateValue;

/// 调度任务
///
/// `next_execution_date` 为空表示当前不可被调度；`locked_at` 与
/// `lock_expires` 同时为空表示未持有租约。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    pub next_execution_date: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expires: Option<DateTime<Utc>>,
    pub test_type: serde_json::Value,
    pub experiment_type: serde_json::Value,
    #[serde(default)]
    pub notification_emails: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Scheduled,
    Processing,
    Executed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Scheduled => "Scheduled",
            TaskStatus::Processing => "Processing",
            TaskStatus::Executed => "Executed",
            TaskStatus::Failed => "Failed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(TaskStatus::Scheduled),
            "Processing" => Ok(TaskStatus::Processing),
            "Executed" => Ok(TaskStatus::Executed),
            "Failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScheduleType {
    #[serde(rename = "oneTime")]
    OneTime,
    #[serde(rename = "recurring")]
    Recurring,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::OneTime => "oneTime",
            ScheduleType::Recurring => "recurring",
        }
    }
}

impl std::str::FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oneTime" => Ok(ScheduleType::OneTime),
            "recurring" => Ok(ScheduleType::Recurring),
            _ => Err(format!("Invalid schedule type: {s}")),
        }
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 创建任务所需的字段
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    pub test_type: serde_json::Value,
    pub experiment_type: serde_json::Value,
    pub notification_emails: Vec<String>,
}

impl Task {
    /// 以 `Scheduled` 状态创建任务，并根据调度配置推导首次执行时间
    pub fn create(new_task: NewTask, now: DateTime<Utc>) -> SchedulerResult<Self> {
        let next_execution_date =
            initial_next_execution(new_task.schedule_type, &new_task.schedule_value, now)?;

        Ok(Self {
            id: Uuid::new_v4(),
            name: new_task.name,
            status: TaskStatus::Scheduled,
            schedule_type: new_task.schedule_type,
            schedule_value: new_task.schedule_value,
            next_execution_date: Some(next_execution_date),
            locked_at: None,
            lock_expires: None,
            test_type: new_task.test_type,
            experiment_type: new_task.experiment_type,
            notification_emails: new_task.notification_emails,
            created_at: now,
        })
    }

    /// 租约存在且尚未过期
    pub fn is_leased_at(&self, now: DateTime<Utc>) -> bool {
        match (self.locked_at, self.lock_expires) {
            (Some(_), Some(expires)) => expires > now,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// 是否可被本次轮询认领。失败的任务不会自动重试。
    pub fn is_claimable(&self, now: DateTime<Utc>, lookahead: Duration) -> bool {
        let due = self
            .next_execution_date
            .is_some_and(|next| next <= now + lookahead);
        due && self.status != TaskStatus::Failed && !self.is_leased_at(now)
    }

    pub fn schedule_snapshot(&self) -> ScheduleSnapshot {
        ScheduleSnapshot {
            status: self.status,
            next_execution_date: self.next_execution_date,
        }
    }

    pub fn entity_description(&self) -> String {
        format!("任务 '{}' ({})", self.name, self.id)
    }
}

/// 租约
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub locked_at: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Lease {
    pub fn new(now: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            locked_at: now,
            expires: now + duration,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// 读取任务时观测到的调度状态
///
/// 条件更新以此判断调度循环是否已在读取之后写入了任务。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    pub status: TaskStatus,
    pub next_execution_date: Option<DateTime<Utc>>,
}

/// 任务状态写入
///
/// 由 Worker 与 Dispatcher 使用，状态、租约和下次执行时间一次性写入。
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusUpdate {
    pub status: TaskStatus,
    pub lease: UpdateValue<Lease>,
    pub next_execution_date: UpdateValue<DateTime<Utc>>,
}

impl TaskStatusUpdate {
    /// 开始执行：仅修改状态
    pub fn processing() -> Self {
        Self {
            status: TaskStatus::Processing,
            lease: UpdateValue::NoChange,
            next_execution_date: UpdateValue::NoChange,
        }
    }

    /// 执行成功：释放租约并写入下次执行时间（一次性任务为空）
    pub fn executed(next_execution_date: Option<DateTime<Utc>>) -> Self {
        Self {
            status: TaskStatus::Executed,
            lease: UpdateValue::Unset,
            next_execution_date: UpdateValue::from_nullable(next_execution_date),
        }
    }

    /// 执行失败：释放租约，保留下次执行时间
    pub fn failed() -> Self {
        Self {
            status: TaskStatus::Failed,
            lease: UpdateValue::Unset,
            next_execution_date: UpdateValue::NoChange,
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        task.status = self.status;
        match &self.lease {
            UpdateValue::Set(lease) => {
                task.locked_at = Some(lease.locked_at);
                task.lock_expires = Some(lease.expires);
            }
            UpdateValue::Unset => {
                task.locked_at = None;
                task.lock_expires = None;
            }
            UpdateValue::NoChange => {}
        }
        task.next_execution_date = self
            .next_execution_date
            .clone()
            .apply_to(task.next_execution_date);
    }
}

/// 任务列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub schedule_type: Option<ScheduleType>,
    pub name_contains: Option<String>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.schedule_type.map_or(true, |t| task.schedule_type == t)
            && self
                .name_contains
                .as_deref()
                .map_or(true, |pattern| task.name.contains(pattern))
    }
}
