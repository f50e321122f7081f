//! Worker 启动器
//!
//! 每次调用创建一个独立的 Worker，发送一条请求，等待一条响应或故障，
//! 结果确定后终止该 Worker。子进程 Worker 在调度器退出后继续运行直至完成。

use std::any::Any;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use cronlease_core::{SchedulerError, SchedulerResult};
use cronlease_domain::{from_json_line, to_json_line, TaskExecutionRequest, TaskExecutionResponse};
use cronlease_worker::TaskWorker;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// 隔离方式，用于日志
    fn isolation(&self) -> &'static str;

    /// Worker 正常上报时返回其响应；Worker 在上报前终止时返回 `WorkerFault`
    async fn execute(&self, request: TaskExecutionRequest) -> SchedulerResult<TaskExecutionResponse>;
}

/// 在独立的 Tokio 任务中运行 Worker
pub struct InProcessLauncher {
    worker: Arc<TaskWorker>,
}

impl InProcessLauncher {
    pub fn new(worker: Arc<TaskWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    fn isolation(&self) -> &'static str {
        "in_process"
    }

    async fn execute(&self, request: TaskExecutionRequest) -> SchedulerResult<TaskExecutionResponse> {
        let (tx, rx) = oneshot::channel();
        let worker = self.worker.clone();
        let handle = tokio::spawn(async move {
            let response = worker.handle(request).await;
            let _ = tx.send(response);
        });

        match rx.await {
            Ok(response) => {
                handle.abort();
                Ok(response)
            }
            Err(_) => match handle.await {
                Err(e) if e.is_panic() => Err(SchedulerError::WorkerFault(format!(
                    "Worker panic: {}",
                    panic_message(e.into_panic())
                ))),
                _ => Err(SchedulerError::WorkerFault(
                    "Worker在上报结果前退出".to_string(),
                )),
            },
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 在子进程中运行 Worker
///
/// 请求以一行 JSON 写入子进程标准输入，响应从其标准输出读取一行。
/// 子进程的标准错误直接继承，用于日志输出。
pub struct ProcessLauncher {
    executable: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
        }
    }

    /// 以当前可执行文件的 `worker` 子命令作为 Worker
    pub fn current_exe(config_path: Option<&str>) -> SchedulerResult<Self> {
        let executable = std::env::current_exe()
            .map_err(|e| SchedulerError::Configuration(format!("无法定位当前可执行文件: {e}")))?;
        Ok(Self::new(executable, Self::worker_args(config_path)))
    }

    pub fn worker_args(config_path: Option<&str>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = config_path {
            args.push("--config".to_string());
            args.push(path.to_string());
        }
        args.push("worker".to_string());
        args
    }

    async fn exchange(
        child: &mut tokio::process::Child,
        request: &TaskExecutionRequest,
    ) -> SchedulerResult<TaskExecutionResponse> {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SchedulerError::WorkerFault("无法获取Worker进程标准输入".to_string()))?;
        let mut line = to_json_line(request)?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SchedulerError::WorkerFault(format!("发送执行请求失败: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| SchedulerError::WorkerFault(format!("发送执行请求失败: {e}")))?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SchedulerError::WorkerFault("无法获取Worker进程标准输出".to_string()))?;
        let mut reader = BufReader::new(stdout);
        let mut response_line = String::new();
        let read = reader
            .read_line(&mut response_line)
            .await
            .map_err(|e| SchedulerError::WorkerFault(format!("读取Worker响应失败: {e}")))?;
        if read == 0 {
            return Err(SchedulerError::WorkerFault(
                "Worker进程未返回结果即退出".to_string(),
            ));
        }

        from_json_line(&response_line)
            .map_err(|e| SchedulerError::WorkerFault(format!("无法解析Worker响应: {e}")))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    fn isolation(&self) -> &'static str {
        "process"
    }

    async fn execute(&self, request: TaskExecutionRequest) -> SchedulerResult<TaskExecutionResponse> {
        let mut command = Command::new(&self.executable);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // 调度器退出时不终止执行中的 Worker，终端信号也不发送给它
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| {
                SchedulerError::WorkerFault(format!(
                    "启动Worker进程失败 {}: {e}",
                    self.executable.display()
                ))
            })?;
        debug!("Worker进程已启动: pid={:?}", child.id());

        let outcome = Self::exchange(&mut child, &request).await;

        if let Err(e) = child.kill().await {
            warn!("终止Worker进程失败: {}", e);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_args_forward_config() {
        assert_eq!(ProcessLauncher::worker_args(None), vec!["worker"]);
        assert_eq!(
            ProcessLauncher::worker_args(Some("cronlease.toml")),
            vec!["--config", "cronlease.toml", "worker"]
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
