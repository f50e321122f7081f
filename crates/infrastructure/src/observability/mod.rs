//! Observability module
//!
//! 结构化日志事件与 Prometheus 指标

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::{init_metrics, MetricsCollector};
pub use structured_logger::StructuredLogger;
