use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use cronlease::app::{AppMode, Application};
use cronlease::seed::seed_sample_tasks;
use cronlease::shutdown::ShutdownManager;
use cronlease_core::{config::AppConfig, init_logging, LogFormat, LogTarget};
use cronlease_infrastructure::SqliteTaskRepository;
use cronlease_worker::{run_worker_process, SimulatedExecutor, TaskWorker};
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "cronlease", version, about = "基于租约的定时任务调度系统")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<String>,

    /// 日志级别，缺省使用配置文件中的值
    #[arg(short, long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// 日志格式: pretty, json, compact
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 运行调度循环和/或API服务器
    Run {
        #[arg(short, long, value_enum, default_value = "all")]
        mode: AppMode,
    },
    /// 子进程Worker入口：从标准输入读取一个请求，向标准输出写入一个响应
    Worker,
    /// 写入示例任务
    Seed {
        /// 先清空已有任务
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format: LogFormat = cli
        .log_format
        .as_deref()
        .unwrap_or(&config.observability.log_format)
        .parse()?;
    // Worker子进程的stdout是协议通道
    let log_target = match cli.command {
        Commands::Worker => LogTarget::Stderr,
        _ => LogTarget::Stdout,
    };
    init_logging(&log_level, log_format, log_target)?;

    match cli.command {
        Commands::Run { mode } => run(config, cli.config, mode).await,
        Commands::Worker => run_worker(config).await,
        Commands::Seed { reset } => seed(config, reset).await,
    }
}

async fn run(config: AppConfig, config_path: Option<String>, mode: AppMode) -> Result<()> {
    info!("启动cronlease，运行模式: {:?}", mode);

    let app = Arc::new(Application::new(config, config_path, mode).await?);
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown = shutdown_manager.clone();
        tokio::spawn(async move { app.run(shutdown).await })
    };

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，停止调度...");
            shutdown_manager.shutdown();
        }
        result = &mut app_handle => {
            return match result {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("应用任务异常结束: {e}")),
            };
        }
    }

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已关闭"),
        Ok(Ok(Err(e))) => error!("应用关闭时发生错误: {e:#}"),
        Ok(Err(e)) => error!("应用任务异常结束: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("cronlease已退出");
    Ok(())
}

async fn run_worker(config: AppConfig) -> Result<()> {
    let repository = Arc::new(
        SqliteTaskRepository::connect(&config.database)
            .await
            .context("Worker进程连接任务存储失败")?,
    );
    let executor = Arc::new(SimulatedExecutor::new(config.worker.simulated_duration()));
    let worker = TaskWorker::new(repository, executor);

    run_worker_process(
        &worker,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
    .context("Worker进程执行失败")?;
    Ok(())
}

async fn seed(config: AppConfig, reset: bool) -> Result<()> {
    let repository = SqliteTaskRepository::connect(&config.database)
        .await
        .context("连接任务存储失败")?;
    let tasks = seed_sample_tasks(&repository, reset, Utc::now()).await?;
    for task in &tasks {
        info!(
            "示例任务: {} 状态: {} 下次执行: {:?}",
            task.entity_description(),
            task.status,
            task.next_execution_date
        );
    }
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
