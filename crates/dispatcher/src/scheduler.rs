use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cronlease_core::SchedulerResult;
use cronlease_domain::Task;
use cronlease_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::dispatcher::TaskDispatcher;
use crate::lease_manager::LeaseManager;

struct RunningLoop {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// 调度循环
///
/// 按固定间隔认领到期任务并逐个分发，不等待分发结果。
/// `stop()` 只停止后续轮询，已分发的 Worker 会继续运行到结束。
pub struct SchedulerLoop {
    lease_manager: Arc<LeaseManager>,
    dispatcher: Arc<TaskDispatcher>,
    poll_interval: Duration,
    metrics: MetricsCollector,
    running: Mutex<Option<RunningLoop>>,
}

impl SchedulerLoop {
    pub fn new(
        lease_manager: Arc<LeaseManager>,
        dispatcher: Arc<TaskDispatcher>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            lease_manager,
            dispatcher,
            poll_interval,
            metrics: MetricsCollector::new(),
            running: Mutex::new(None),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// 启动调度循环。已在运行时不做任何事并返回 false。
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running();
        if running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            warn!("调度循环已在运行，忽略重复启动");
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = this.tick_once(Utc::now()).await {
                            this.metrics.record_tick_failure();
                            StructuredLogger::log_tick_failed(&e.to_string());
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("调度循环收到关闭信号");
                        break;
                    }
                }
            }
        });

        info!(
            "调度循环已启动，轮询间隔: {}ms",
            self.poll_interval.as_millis()
        );
        *running = Some(RunningLoop {
            shutdown_tx,
            handle,
        });
        true
    }

    /// 停止后续轮询并立即返回，不等待正在执行的 Worker
    pub fn stop(&self) {
        if let Some(running) = self.running().take() {
            let _ = running.shutdown_tx.send(());
            info!(
                "调度循环已停止，仍在执行的分发: {}",
                self.dispatcher.in_flight()
            );
        }
    }

    /// 执行一次轮询：认领到期任务并分发，返回本次认领的任务
    pub async fn tick_once(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Task>> {
        let started = Instant::now();
        let claimed = self.lease_manager.claim(now).await?;

        for task in &claimed {
            self.dispatcher.dispatch(task.clone());
        }

        let elapsed = started.elapsed();
        self.metrics
            .record_tick(claimed.len(), elapsed.as_secs_f64());
        StructuredLogger::log_tick(claimed.len(), elapsed.as_millis() as u64);
        Ok(claimed)
    }
}
