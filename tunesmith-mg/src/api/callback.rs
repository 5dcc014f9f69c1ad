//! Provider callback handler
//!
//! POST /callback: the provider's asynchronous progress notification.
//! Malformed payloads are acknowledged as `ignored` with a 200 so the
//! provider does not retry indefinitely; only a storage failure produces an
//! error status (worth a provider retry).

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiResult;
use crate::services::reconciler::CallbackDisposition;
use crate::AppState;

/// POST /callback response body
#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// POST /callback
pub async fn callback(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<CallbackResponse>> {
    match state.reconciler.handle_callback(payload).await? {
        CallbackDisposition::Saved { task_id, .. } => Ok(Json(CallbackResponse {
            status: "saved",
            task_id: Some(task_id),
        })),
        CallbackDisposition::Ignored { .. } => Ok(Json(CallbackResponse {
            status: "ignored",
            task_id: None,
        })),
    }
}

/// Build callback routes
pub fn callback_routes() -> Router<AppState> {
    Router::new().route("/callback", post(callback))
}
