//! Task read endpoints
//!
//! GET /tasks (newest first), GET /tasks/{task_id}, and the legacy alias
//! GET /status/{task_id} kept for older clients.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::ApiResult;
use crate::models::Task;
use crate::AppState;

/// GET /tasks response body
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
}

/// GET /tasks/{task_id}
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task = state.reconciler.status(&task_id).await?;
    Ok(Json(task))
}

/// GET /tasks
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<TaskListResponse>> {
    let tasks = state.reconciler.list().await?;
    Ok(Json(TaskListResponse { tasks }))
}

/// Build task read routes
pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/:task_id", get(get_task_status))
        .route("/status/:task_id", get(get_task_status))
}
