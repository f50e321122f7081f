use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 调度循环与租约配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 轮询间隔（秒）
    pub poll_interval_seconds: u64,
    /// 提前认领窗口（秒）
    pub lookahead_seconds: u64,
    /// 租约时长（秒），必须大于轮询间隔
    pub lease_duration_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 5,
            lookahead_seconds: 10,
            lease_duration_seconds: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        if self.lease_duration_seconds <= self.poll_interval_seconds {
            return Err(anyhow::anyhow!(
                "租约时长({}秒)必须大于轮询间隔({}秒)",
                self.lease_duration_seconds,
                self.poll_interval_seconds
            ));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn lookahead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lookahead_seconds as i64)
    }

    pub fn lease_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_duration_seconds as i64)
    }
}

/// Worker隔离方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerIsolation {
    /// 独立的Tokio任务
    InProcess,
    /// 独立的子进程
    Process,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub isolation: WorkerIsolation,
    /// 模拟任务体的执行时长（毫秒）
    pub simulated_duration_ms: u64,
    /// 子进程模式下使用的可执行文件，缺省为当前进程
    pub executable: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            isolation: WorkerIsolation::InProcess,
            simulated_duration_ms: 30_000,
            executable: None,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.executable {
            if path.trim().is_empty() {
                return Err(anyhow::anyhow!("Worker可执行文件路径不能为空字符串"));
            }
        }
        Ok(())
    }

    pub fn simulated_duration(&self) -> Duration {
        Duration::from_millis(self.simulated_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_defaults_match_reference_cadence() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.lookahead(), chrono::Duration::seconds(10));
        assert_eq!(config.lease_duration(), chrono::Duration::seconds(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lease_must_exceed_poll_interval() {
        let config = SchedulerConfig {
            poll_interval_seconds: 10,
            lease_duration_seconds: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = SchedulerConfig {
            poll_interval_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_isolation_serde_names() {
        let json = serde_json::to_string(&WorkerIsolation::InProcess).unwrap();
        assert_eq!(json, "\"in_process\"");
        let parsed: WorkerIsolation = serde_json::from_str("\"process\"").unwrap();
        assert_eq!(parsed, WorkerIsolation::Process);
    }
}
