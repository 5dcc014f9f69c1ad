//! Audio download handler
//!
//! GET /download/{task_id}: materialize the completed task's asset if
//! needed and stream it back. A fetch failure is a retryable 502 and never
//! changes the task's generation status.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::models::TaskStatus;
use crate::AppState;

/// GET /download/{task_id}
pub async fn download(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let task = state.reconciler.status(&task_id).await?;

    let audio_url = match (task.status, task.audio_url) {
        (TaskStatus::Complete, Some(url)) => url,
        _ => {
            return Err(ApiError::NotFound(format!(
                "Audio not ready for task {}",
                task_id
            )))
        }
    };

    let path = state
        .fetcher
        .materialize(&state.db, &task_id, &audio_url)
        .await?;

    let file = tokio::fs::File::open(&path).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.mp3\"", task_id),
        )
        .body(body)
        .map_err(|e| ApiError::Internal(format!("Failed to build download response: {}", e)))
}

/// Build download routes
pub fn download_routes() -> Router<AppState> {
    Router::new().route("/download/:task_id", get(download))
}
