use axum::{extract::State, http::header, response::IntoResponse};

use crate::{error::ApiError, routes::AppState};

/// 以 Prometheus 文本格式导出指标
pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let handle = state.metrics_handle.as_ref().ok_or(ApiError::NotFound)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
