use std::time::Duration;

use async_trait::async_trait;
use cronlease_core::SchedulerResult;
use cronlease_domain::{ports::TaskExecutor, Task};
use tokio::time::sleep;
use tracing::debug;

/// 模拟执行器：固定耗时后成功返回
pub struct SimulatedExecutor {
    duration: Duration,
}

impl SimulatedExecutor {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(30_000))
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task) -> SchedulerResult<()> {
        debug!(
            "模拟执行任务 {}，耗时 {}ms",
            task.entity_description(),
            self.duration.as_millis()
        );
        sleep(self.duration).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
