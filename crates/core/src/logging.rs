//! 日志初始化
//!
//! 基于 `tracing-subscriber`，`RUST_LOG` 环境变量优先于配置中的日志级别。

use std::str::FromStr;

use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(anyhow::anyhow!("不支持的日志格式: {s}")),
        }
    }
}

/// 日志输出目标
///
/// 子进程Worker的stdout是协议通道，日志必须写到stderr。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

impl LogTarget {
    fn writer(self) -> BoxMakeWriter {
        match self {
            LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// 初始化日志系统
pub fn init_logging(log_level: &str, format: LogFormat, target: LogTarget) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(target.writer()))
            .try_init()
            .context("初始化JSON日志格式失败")?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(target.writer()))
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(target.writer()))
            .try_init()
            .context("初始化Compact日志格式失败")?,
    }

    Ok(())
}
