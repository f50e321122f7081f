use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::{
    health::health_check,
    metrics::prometheus_metrics,
    tasks::{create_task, delete_task, fallback, get_task, list_tasks, update_task},
};
use crate::service::TaskService;

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub task_service: TaskService,
    /// 未启用指标时为空，`/metrics` 返回 404
    pub metrics_handle: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .fallback(fallback)
        .with_state(state)
}
