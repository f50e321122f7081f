use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cronlease_core::SchedulerError;
use cronlease_domain::{
    repositories::TaskRepository, Task, TaskExecutionRequest, TaskStatusUpdate,
};
use cronlease_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::task::JoinHandle;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use crate::launcher::WorkerLauncher;

/// 单次分发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    /// Worker 上报失败
    Failed(String),
    /// Worker 未能上报结果
    Faulted(String),
}

/// 任务分发器
///
/// 每个任务对应一个独立 Worker。失败或故障时将任务标记为 `Failed` 并释放租约，
/// 下次执行时间保持不变，不做重试。
pub struct TaskDispatcher {
    repository: Arc<dyn TaskRepository>,
    launcher: Arc<dyn WorkerLauncher>,
    metrics: MetricsCollector,
    in_flight: Arc<AtomicUsize>,
}

impl TaskDispatcher {
    pub fn new(repository: Arc<dyn TaskRepository>, launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self {
            repository,
            launcher,
            metrics: MetricsCollector::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 正在执行的分发数量
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 在后台分发任务，调用方无需等待
    pub fn dispatch(self: &Arc<Self>, task: Task) -> JoinHandle<DispatchOutcome> {
        let dispatcher = Arc::clone(self);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let outcome = dispatcher.run_to_completion(task).await;
            dispatcher.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        })
    }

    /// 执行一次完整的分发并等待结果
    pub async fn run_to_completion(&self, task: Task) -> DispatchOutcome {
        let task_id = task.id;
        let span = info_span!("dispatch", task.id = %task_id, task.name = %task.name);

        async {
            StructuredLogger::log_task_dispatched(&task, self.launcher.isolation());
            self.metrics.record_dispatch();

            let outcome = match self.launcher.execute(TaskExecutionRequest::new(task)).await {
                Ok(response) if response.task_id != task_id => DispatchOutcome::Faulted(format!(
                    "Worker返回了其他任务的结果: {}",
                    response.task_id
                )),
                Ok(response) if response.success => DispatchOutcome::Succeeded,
                Ok(response) => DispatchOutcome::Failed(
                    response
                        .error
                        .unwrap_or_else(|| "Unknown error".to_string()),
                ),
                Err(SchedulerError::WorkerFault(reason)) => DispatchOutcome::Faulted(reason),
                Err(e) => DispatchOutcome::Faulted(e.to_string()),
            };

            match &outcome {
                DispatchOutcome::Succeeded => {}
                DispatchOutcome::Failed(reason) => {
                    self.mark_failed(task_id, reason).await;
                }
                DispatchOutcome::Faulted(reason) => {
                    StructuredLogger::log_worker_fault(task_id, reason);
                    self.metrics.record_worker_fault();
                    self.mark_failed(task_id, reason).await;
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn mark_failed(&self, task_id: Uuid, reason: &str) {
        self.metrics.record_task_failure();
        match self
            .repository
            .write_task_status(task_id, &TaskStatusUpdate::failed())
            .await
        {
            Ok(()) => StructuredLogger::log_task_marked_failed(task_id, reason),
            Err(e) => error!("标记任务 {} 失败状态时出错: {}", task_id, e),
        }
    }
}
