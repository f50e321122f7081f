use async_trait::async_trait;
use cronlease_core::SchedulerResult;

use crate::entities::Task;

/// 任务体的执行接口
///
/// 返回 `Err` 表示任务体失败，Worker 会据此上报失败结果。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> SchedulerResult<()>;

    fn name(&self) -> &str;
}
