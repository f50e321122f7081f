use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

/// 健康检查，同时探测任务存储是否可用
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store = match state.task_service.ping().await {
        Ok(()) => "ok",
        Err(_) => "unavailable",
    };
    let status = if store == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": store,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "cronlease",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
