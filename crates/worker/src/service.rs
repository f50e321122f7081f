use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use cronlease_core::SchedulerResult;
use cronlease_domain::{
    next_execution, ports::TaskExecutor, repositories::TaskRepository, ScheduleType, Task,
    TaskExecutionRequest, TaskExecutionResponse, TaskStatusUpdate,
};
use cronlease_infrastructure::{MetricsCollector, StructuredLogger};
use tracing::{info_span, Instrument};

/// 单个任务的执行单元
///
/// 标记 `Processing`，运行任务体，成功后计算下次执行时间并写入终态。
/// 失败时不写终态，仅上报，由 Dispatcher 负责标记失败并释放租约。
pub struct TaskWorker {
    repository: Arc<dyn TaskRepository>,
    executor: Arc<dyn TaskExecutor>,
    metrics: MetricsCollector,
}

impl TaskWorker {
    pub fn new(repository: Arc<dyn TaskRepository>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            repository,
            executor,
            metrics: MetricsCollector::new(),
        }
    }

    /// 处理一条执行请求，总是返回恰好一条响应
    pub async fn handle(&self, request: TaskExecutionRequest) -> TaskExecutionResponse {
        let task = request.task;
        let span = info_span!("task_worker", task.id = %task.id, executor = self.executor.name());

        async {
            let started = Instant::now();
            StructuredLogger::log_task_execution_start(&task);

            let outcome = self.run(&task).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(next_execution_date) => {
                    self.metrics
                        .record_task_completion(started.elapsed().as_secs_f64());
                    StructuredLogger::log_task_execution_complete(
                        task.id,
                        &task.name,
                        true,
                        duration_ms,
                        next_execution_date,
                        None,
                    );
                    TaskExecutionResponse::success(task.id)
                }
                Err(e) => {
                    let message = e.to_string();
                    StructuredLogger::log_task_execution_complete(
                        task.id,
                        &task.name,
                        false,
                        duration_ms,
                        None,
                        Some(&message),
                    );
                    TaskExecutionResponse::failure(task.id, message)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, task: &Task) -> SchedulerResult<Option<DateTime<Utc>>> {
        self.repository
            .write_task_status(task.id, &TaskStatusUpdate::processing())
            .await?;

        self.executor.execute(task).await?;

        let completed_at = Utc::now();
        let next_execution_date = match task.schedule_type {
            ScheduleType::Recurring => Some(next_execution(&task.schedule_value, completed_at)?),
            ScheduleType::OneTime => None,
        };

        self.repository
            .write_task_status(task.id, &TaskStatusUpdate::executed(next_execution_date))
            .await?;

        Ok(next_execution_date)
    }
}
