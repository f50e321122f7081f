//! Dispatcher 与 Worker 之间的消息协议
//!
//! 每个 Worker 只接收一条请求并回复一条响应。子进程模式下两者各占一行 JSON。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cronlease_core::SchedulerResult;

use crate::entities::Task;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionRequest {
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionResponse {
    pub task_id: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskExecutionRequest {
    pub fn new(task: Task) -> Self {
        Self { task }
    }
}

impl TaskExecutionResponse {
    pub fn success(task_id: Uuid) -> Self {
        Self {
            task_id,
            success: true,
            error: None,
        }
    }

    pub fn failure(task_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            task_id,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// 编码为单行 JSON（不含换行符）
pub fn to_json_line<T: Serialize>(message: &T) -> SchedulerResult<String> {
    Ok(serde_json::to_string(message)?)
}

pub fn from_json_line<T: for<'de> Deserialize<'de>>(line: &str) -> SchedulerResult<T> {
    Ok(serde_json::from_str(line.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_shape() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(TaskExecutionResponse::failure(id, "boom")).unwrap();
        assert_eq!(value, json!({"taskId": id, "success": false, "error": "boom"}));

        let value = serde_json::to_value(TaskExecutionResponse::success(id)).unwrap();
        assert_eq!(value, json!({"taskId": id, "success": true}));
    }

    #[test]
    fn test_response_from_line() {
        let id = Uuid::new_v4();
        let line = format!("{{\"taskId\":\"{id}\",\"success\":true}}\n");
        let response: TaskExecutionResponse = from_json_line(&line).unwrap();
        assert_eq!(response, TaskExecutionResponse::success(id));
        assert!(from_json_line::<TaskExecutionResponse>("not json").is_err());
    }
}
