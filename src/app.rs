use std::sync::Arc;

use anyhow::{Context, Result};
use cronlease_api::{create_app, serve};
use cronlease_core::config::{AppConfig, WorkerIsolation};
use cronlease_dispatcher::{
    InProcessLauncher, LeaseManager, ProcessLauncher, SchedulerLoop, TaskDispatcher,
    WorkerLauncher,
};
use cronlease_domain::repositories::TaskRepository;
use cronlease_infrastructure::{init_metrics, SqliteTaskRepository, StructuredLogger};
use cronlease_worker::{SimulatedExecutor, TaskWorker};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::shutdown::ShutdownManager;

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AppMode {
    /// 仅运行调度循环
    Scheduler,
    /// 仅运行API服务器
    Api,
    /// 运行所有组件
    All,
}

impl AppMode {
    fn runs_scheduler(self) -> bool {
        matches!(self, AppMode::Scheduler | AppMode::All)
    }

    fn runs_api(self) -> bool {
        matches!(self, AppMode::Api | AppMode::All)
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    config_path: Option<String>,
    mode: AppMode,
    repository: Arc<SqliteTaskRepository>,
    metrics_handle: Option<PrometheusHandle>,
}

impl Application {
    pub async fn new(config: AppConfig, config_path: Option<String>, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        if mode == AppMode::Scheduler && !config.scheduler.enabled {
            return Err(anyhow::anyhow!("调度循环被禁用，请检查配置"));
        }
        if mode == AppMode::Api && !config.api.enabled {
            return Err(anyhow::anyhow!("API模式被禁用，请检查配置"));
        }

        let repository = Arc::new(
            SqliteTaskRepository::connect(&config.database)
                .await
                .context("初始化任务存储失败")?,
        );

        let metrics_handle = if config.observability.metrics_enabled {
            Some(init_metrics()?)
        } else {
            None
        };

        Ok(Self {
            config,
            config_path,
            mode,
            repository,
            metrics_handle,
        })
    }

    pub fn repository(&self) -> Arc<dyn TaskRepository> {
        self.repository.clone()
    }

    fn build_launcher(&self) -> Result<Arc<dyn WorkerLauncher>> {
        let worker_config = &self.config.worker;
        let launcher: Arc<dyn WorkerLauncher> = match worker_config.isolation {
            WorkerIsolation::InProcess => {
                let executor = Arc::new(SimulatedExecutor::new(worker_config.simulated_duration()));
                let worker = Arc::new(TaskWorker::new(self.repository(), executor));
                Arc::new(InProcessLauncher::new(worker))
            }
            WorkerIsolation::Process => {
                let config_path = self.config_path.as_deref();
                let launcher = match &worker_config.executable {
                    Some(executable) => {
                        ProcessLauncher::new(executable, ProcessLauncher::worker_args(config_path))
                    }
                    None => ProcessLauncher::current_exe(config_path)?,
                };
                Arc::new(launcher)
            }
        };
        Ok(launcher)
    }

    /// 按配置组装租约管理器、分发器和调度循环
    pub fn build_scheduler(&self) -> Result<Arc<SchedulerLoop>> {
        let lease_manager = Arc::new(LeaseManager::from_config(
            self.repository(),
            &self.config.scheduler,
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(
            self.repository(),
            self.build_launcher()?,
        ));

        Ok(Arc::new(SchedulerLoop::new(
            lease_manager,
            dispatcher,
            self.config.scheduler.poll_interval(),
        )))
    }

    /// 运行到收到关闭信号为止
    ///
    /// 关闭时只停止调度循环的后续轮询，已分发的任务不等待。
    pub async fn run(&self, shutdown: ShutdownManager) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);
        StructuredLogger::log_system_event("application_started", &format!("{:?}", self.mode));

        let scheduler = if self.mode.runs_scheduler() && self.config.scheduler.enabled {
            let scheduler = self.build_scheduler()?;
            scheduler.start();
            Some(scheduler)
        } else {
            None
        };

        let mut api_handle = if self.mode.runs_api() && self.config.api.enabled {
            Some(self.spawn_api(&shutdown))
        } else {
            None
        };

        let api_exited = tokio::select! {
            _ = shutdown.wait() => false,
            result = wait_api(&mut api_handle) => {
                log_api_result(result);
                true
            }
        };

        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
        if api_exited {
            shutdown.shutdown();
        } else if let Some(handle) = api_handle {
            log_api_result(handle.await);
        }

        StructuredLogger::log_system_event("application_stopped", "应用程序已停止");
        Ok(())
    }

    fn spawn_api(&self, shutdown: &ShutdownManager) -> JoinHandle<Result<()>> {
        let app = create_app(
            self.repository(),
            &self.config.api,
            self.metrics_handle.clone(),
        );
        let bind_address = self.config.api.bind_address.clone();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            serve(app, &bind_address, async move { shutdown.wait().await }).await
        })
    }
}

async fn wait_api(
    handle: &mut Option<JoinHandle<Result<()>>>,
) -> Result<Result<()>, tokio::task::JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn log_api_result(result: Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("API服务器运行失败: {e:#}"),
        Err(e) => warn!("API服务器任务异常结束: {e}"),
    }
}
