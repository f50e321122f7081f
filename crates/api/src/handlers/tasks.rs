use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    response::{created, message, success},
    routes::AppState,
    types::{CreateTaskRequest, TaskQueryParams, TaskResponse, UpdateTaskRequest},
};

/// 获取任务列表
pub async fn list_tasks(
    State(state): State<AppState>,
    query: Result<Query<TaskQueryParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = query?;
    let tasks: Vec<TaskResponse> = state
        .task_service
        .list_tasks(params)
        .await?
        .into_iter()
        .map(TaskResponse::from)
        .collect();
    Ok(success(tasks))
}

/// 创建任务
pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let task = state.task_service.create_task(request).await?;
    Ok(created(TaskResponse::from(task)))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let task = state.task_service.get_task(id).await?;
    Ok(success(TaskResponse::from(task)))
}

/// 更新任务
pub async fn update_task(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let Json(request) = body?;
    let task = state.task_service.update_task(id, request).await?;
    Ok(success(TaskResponse::from(task)))
}

/// 删除任务
pub async fn delete_task(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    state.task_service.delete_task(id).await?;
    Ok(message("任务已删除"))
}

pub async fn fallback() -> ApiError {
    ApiError::NotFound
}
