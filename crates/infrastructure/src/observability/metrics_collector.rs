//! Metrics collector
//!
//! 使用 `metrics` crate 记录调度指标，通过 Prometheus 导出。

use anyhow::Result;
use metrics::{counter, histogram, Counter, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

#[derive(Clone)]
pub struct MetricsCollector {
    ticks_total: Counter,
    tick_failures_total: Counter,
    tasks_claimed_total: Counter,
    tasks_dispatched_total: Counter,
    task_completions_total: Counter,
    task_failures_total: Counter,
    worker_faults_total: Counter,
    tick_duration: Histogram,
    task_execution_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            ticks_total: counter!("cronlease_scheduler_ticks_total"),
            tick_failures_total: counter!("cronlease_scheduler_tick_failures_total"),
            tasks_claimed_total: counter!("cronlease_tasks_claimed_total"),
            tasks_dispatched_total: counter!("cronlease_tasks_dispatched_total"),
            task_completions_total: counter!("cronlease_task_completions_total"),
            task_failures_total: counter!("cronlease_task_failures_total"),
            worker_faults_total: counter!("cronlease_worker_faults_total"),
            tick_duration: histogram!("cronlease_scheduler_tick_duration_seconds"),
            task_execution_duration: histogram!("cronlease_task_execution_duration_seconds"),
        }
    }

    pub fn record_tick(&self, claimed: usize, duration_seconds: f64) {
        self.ticks_total.increment(1);
        self.tasks_claimed_total.increment(claimed as u64);
        self.tick_duration.record(duration_seconds);
    }

    pub fn record_tick_failure(&self) {
        self.tick_failures_total.increment(1);
    }

    pub fn record_dispatch(&self) {
        self.tasks_dispatched_total.increment(1);
    }

    pub fn record_task_completion(&self, duration_seconds: f64) {
        self.task_completions_total.increment(1);
        self.task_execution_duration.record(duration_seconds);
    }

    pub fn record_task_failure(&self) {
        self.task_failures_total.increment(1);
    }

    pub fn record_worker_fault(&self) {
        self.worker_faults_total.increment(1);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// 安装全局 Prometheus 记录器，返回用于渲染 `/metrics` 的句柄
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

    info!("Prometheus metrics recorder installed");
    Ok(handle)
}
