//! # cronlease HTTP API
//!
//! 提供任务管理的 REST 接口：
//!
//! - `GET /health` 健康检查
//! - `GET /tasks`、`POST /tasks` 查询与创建任务
//! - `GET|PATCH|DELETE /tasks/{id}` 单个任务的查询、部分更新与删除
//! - `GET /metrics` Prometheus 指标（启用指标时）
//!
//! 成功响应统一包装为 `{ success, data, message, timestamp }`，
//! 错误响应为 `{ error: { message, type, code, timestamp } }`。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod service;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use cronlease_core::config::models::ApiConfig;
use cronlease_domain::repositories::TaskRepository;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::info;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};
pub use service::TaskService;

use middleware::{cors_layer, request_logging, trace_layer};

/// 创建完整的API应用
pub fn create_app(
    task_repo: Arc<dyn TaskRepository>,
    api_config: &ApiConfig,
    metrics_handle: Option<PrometheusHandle>,
) -> Router {
    let state = AppState {
        task_service: TaskService::new(task_repo),
        metrics_handle,
    };

    let router = create_routes(state);
    let router = if api_config.cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    };

    router.layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}

/// 绑定地址并提供服务，`shutdown` 完成后停止接受新连接
pub async fn serve<F>(app: Router, bind_address: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("无法绑定API地址: {bind_address}"))?;
    info!("API服务器监听: {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API服务器异常退出")?;

    info!("API服务器已停止");
    Ok(())
}
