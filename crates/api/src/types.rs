//! HTTP 请求与响应体
//!
//! 对外的任务表示把调度方式组合成 `schedule: { type, value }`，
//! 字段名统一使用 camelCase。

use chrono::{DateTime, Utc};
use cronlease_domain::{ScheduleType, Task, TaskStatus, UpdateValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    pub value: String,
}

/// 任务创建请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub name: String,
    pub schedule: Schedule,
    #[serde(default)]
    pub test_type: serde_json::Value,
    #[serde(default)]
    pub experiment_type: serde_json::Value,
    #[serde(default)]
    pub notification_emails: Vec<String>,
}

/// 任务更新请求
///
/// 未出现的字段保持不变。`nextExecutionDate` 显式传 `null` 时清空下次执行时间，
/// 任务将不再被调度。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub status: Option<TaskStatus>,
    pub schedule: Option<Schedule>,
    pub test_type: Option<serde_json::Value>,
    pub experiment_type: Option<serde_json::Value>,
    pub notification_emails: Option<Vec<String>>,
    #[serde(default)]
    pub next_execution_date: UpdateValue<DateTime<Utc>>,
}

/// 任务查询参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
    pub status: Option<TaskStatus>,
    pub schedule_type: Option<ScheduleType>,
    pub name: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    pub schedule: Schedule,
    pub next_execution_date: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expires: Option<DateTime<Utc>>,
    pub test_type: serde_json::Value,
    pub experiment_type: serde_json::Value,
    pub notification_emails: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            name: task.name,
            status: task.status,
            schedule: Schedule {
                schedule_type: task.schedule_type,
                value: task.schedule_value,
            },
            next_execution_date: task.next_execution_date,
            locked_at: task.locked_at,
            lock_expires: task.lock_expires,
            test_type: task.test_type,
            experiment_type: task.experiment_type,
            notification_emails: task.notification_emails,
            created_at: task.created_at,
        }
    }
}
