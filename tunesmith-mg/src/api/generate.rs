//! Generation request handler
//!
//! POST /generate: validate the request, hand it to the reconciler, answer
//! 202 with the new task id. Provider and storage failures surface to the
//! caller as JSON errors rather than being swallowed.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::TaskStatus;
use crate::services::reconciler::GenerateParams;
use crate::AppState;

/// POST /generate request body
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub instrumental: bool,
}

/// POST /generate response body
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

/// POST /generate
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }

    let params = GenerateParams {
        prompt: request.prompt,
        style: request.style,
        title: request.title,
        instrumental: request.instrumental,
    };

    let task = match state.reconciler.submit(params).await {
        Ok(task) => task,
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            return Err(e.into());
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            task_id: task.task_id,
            status: task.status,
        }),
    ))
}

/// Build generation routes
pub fn generate_routes() -> Router<AppState> {
    Router::new().route("/generate", post(generate))
}
