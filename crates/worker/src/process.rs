//! 子进程模式下的 Worker 入口
//!
//! 从标准输入读取一行请求，向标准输出写入一行响应。日志只能写到标准错误。

use cronlease_core::{SchedulerError, SchedulerResult};
use cronlease_domain::{from_json_line, to_json_line, TaskExecutionRequest};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::service::TaskWorker;

pub async fn run_worker_process<R, W>(
    worker: &TaskWorker,
    mut reader: R,
    mut writer: W,
) -> SchedulerResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| SchedulerError::WorkerFault(format!("读取执行请求失败: {e}")))?;
    if read == 0 {
        return Err(SchedulerError::WorkerFault(
            "标准输入在收到执行请求前关闭".to_string(),
        ));
    }

    let request: TaskExecutionRequest = from_json_line(&line)?;
    debug!("Worker进程收到任务 {}", request.task.id);

    let response = worker.handle(request).await;

    let mut output = to_json_line(&response)?;
    output.push('\n');
    writer
        .write_all(output.as_bytes())
        .await
        .map_err(|e| SchedulerError::WorkerFault(format!("写入执行结果失败: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| SchedulerError::WorkerFault(format!("写入执行结果失败: {e}")))?;
    Ok(())
}
