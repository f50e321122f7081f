use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    scheduler_worker::{SchedulerConfig, WorkerConfig, WorkerIsolation},
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: CRONLEASE_, nesting: `__`)
    ///
    /// An explicit `config_path` that does not exist is an error; without a
    /// path the default locations are probed and skipped when absent.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default()).context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = [
                "config/cronlease.toml",
                "cronlease.toml",
                "/etc/cronlease/config.toml",
            ];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CRONLEASE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;

        self.scheduler.validate().context("调度器配置验证失败")?;

        self.worker.validate().context("Worker配置验证失败")?;

        self.api.validate().context("API配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        // 子进程无法访问父进程的内存数据库
        if self.worker.isolation == WorkerIsolation::Process && self.database.is_in_memory() {
            return Err(anyhow::anyhow!(
                "子进程隔离模式不支持内存数据库，请使用文件数据库"
            ));
        }

        // 租约不会续期，任务体运行时间超过租约会导致重复认领
        let lease_ms = self.scheduler.lease_duration_seconds.saturating_mul(1000);
        if self.worker.simulated_duration_ms > lease_ms {
            warn!(
                "任务执行时长({}ms)超过租约时长({}ms)，运行中的任务可能被再次认领",
                self.worker.simulated_duration_ms, lease_ms
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.poll_interval_seconds, 5);
        assert_eq!(config.worker.isolation, WorkerIsolation::InProcess);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [scheduler]
            poll_interval_seconds = 2
            lease_duration_seconds = 30

            [worker]
            isolation = "process"
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.poll_interval_seconds, 2);
        assert_eq!(config.scheduler.lookahead_seconds, 10);
        assert_eq!(config.worker.isolation, WorkerIsolation::Process);
        assert_eq!(config.database.url, "sqlite://cronlease.db");
    }

    #[test]
    fn test_invalid_lease_rejected_from_toml() {
        let result = AppConfig::from_toml(
            r#"
            [scheduler]
            poll_interval_seconds = 10
            lease_duration_seconds = 5
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.api.bind_address, config.api.bind_address);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [database]
            url = "sqlite::memory:"

            [api]
            bind_address = "127.0.0.1:8088"
            "#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert!(config.database.is_in_memory());
        assert_eq!(config.api.bind_address, "127.0.0.1:8088");
    }

    #[test]
    fn test_process_isolation_requires_file_database() {
        let result = AppConfig::from_toml(
            r#"
            [database]
            url = "sqlite::memory:"

            [worker]
            isolation = "process"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/cronlease.toml")).is_err());
    }
}
