//! Structured logging utilities
//!
//! 调度器各阶段的结构化日志事件，字段统一使用 `event` 与 `task.*` 前缀。

use chrono::{DateTime, Utc};
use cronlease_domain::Task;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_claimed(task: &Task, lease_expires: DateTime<Utc>) {
        info!(
            event = "task_claimed",
            task.id = %task.id,
            task.name = %task.name,
            task.schedule_type = %task.schedule_type,
            task.next_execution_date = ?task.next_execution_date,
            lease.expires = %lease_expires,
            "Task claimed"
        );
    }

    pub fn log_task_dispatched(task: &Task, isolation: &str) {
        info!(
            event = "task_dispatched",
            task.id = %task.id,
            task.name = %task.name,
            worker.isolation = isolation,
            "Task dispatched to worker"
        );
    }

    pub fn log_task_execution_start(task: &Task) {
        info!(
            event = "task_execution_start",
            task.id = %task.id,
            task.name = %task.name,
            "Task execution started"
        );
    }

    pub fn log_task_execution_complete(
        task_id: Uuid,
        task_name: &str,
        success: bool,
        duration_ms: u64,
        next_execution_date: Option<DateTime<Utc>>,
        error_message: Option<&str>,
    ) {
        if success {
            info!(
                event = "task_execution_complete",
                task.id = %task_id,
                task.name = task_name,
                task.success = success,
                task.duration_ms = duration_ms,
                task.next_execution_date = ?next_execution_date,
                "Task execution completed successfully"
            );
        } else {
            error!(
                event = "task_execution_failed",
                task.id = %task_id,
                task.name = task_name,
                task.success = success,
                task.duration_ms = duration_ms,
                task.error = error_message.unwrap_or("Unknown error"),
                "Task execution failed"
            );
        }
    }

    pub fn log_worker_fault(task_id: Uuid, reason: &str) {
        error!(
            event = "worker_fault",
            task.id = %task_id,
            worker.fault = reason,
            "Worker terminated without a result"
        );
    }

    pub fn log_task_marked_failed(task_id: Uuid, reason: &str) {
        warn!(
            event = "task_marked_failed",
            task.id = %task_id,
            task.error = reason,
            "Task marked as failed and lease released"
        );
    }

    pub fn log_tick(claimed: usize, duration_ms: u64) {
        debug!(
            event = "scheduler_tick",
            tick.claimed = claimed,
            tick.duration_ms = duration_ms,
            "Scheduler tick finished"
        );
    }

    pub fn log_tick_failed(error_message: &str) {
        error!(
            event = "scheduler_tick_failed",
            tick.error = error_message,
            "Scheduler tick failed"
        );
    }

    pub fn log_system_event(event_type: &str, message: &str) {
        info!(event = "system_event", system.event_type = event_type, "{}", message);
    }
}
