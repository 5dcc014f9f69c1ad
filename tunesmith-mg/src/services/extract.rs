//! Provider response normalization
//!
//! The provider's JSON shapes are inconsistent across endpoints and callback
//! versions: the task identifier appears as `taskId`, `task_id`, nested
//! `data.taskId`, or the echoed `externalId`; the audio URL and status move
//! around similarly. Each field has one explicit, ordered list of key paths
//! tried in sequence; the first match wins and a missing required field is a
//! well-defined failure at the caller (never an ad hoc chained fallback).

use serde_json::Value;

use crate::models::TaskStatus;

/// One step in a key path: an object key or an array index
#[derive(Debug, Clone, Copy)]
pub enum Seg {
    Key(&'static str),
    Idx(usize),
}

use Seg::{Idx, Key};

/// Task id as echoed back from our submission (`externalId`) or assigned by
/// the provider. The echoed id is tried first so locally submitted tasks
/// reconcile against their canonical row.
pub const TASK_ID_PATHS: &[&[Seg]] = &[
    &[Key("externalId")],
    &[Key("data"), Key("externalId")],
    &[Key("taskId")],
    &[Key("task_id")],
    &[Key("data"), Key("taskId")],
    &[Key("data"), Key("task_id")],
    &[Key("id")],
];

/// Provider-assigned task id only (submit responses never echo `externalId`
/// at the top level, and `id` there is a request id, not a task id)
pub const PROVIDER_TASK_ID_PATHS: &[&[Seg]] = &[
    &[Key("data"), Key("taskId")],
    &[Key("data"), Key("task_id")],
    &[Key("taskId")],
    &[Key("task_id")],
];

/// Status word locations, covering record-info bodies (`data.status`) and
/// both callback generations (`callbackType` at either level)
pub const STATUS_PATHS: &[&[Seg]] = &[
    &[Key("data"), Key("callbackType")],
    &[Key("callbackType")],
    &[Key("data"), Key("status")],
    &[Key("status")],
];

/// Audio URL locations, newest provider shape first
pub const AUDIO_URL_PATHS: &[&[Seg]] = &[
    &[Key("data"), Key("response"), Key("sunoData"), Idx(0), Key("audioUrl")],
    &[Key("data"), Key("response"), Key("sunoData"), Idx(0), Key("audio_url")],
    &[Key("data"), Key("audioUrl")],
    &[Key("data"), Key("audio_url")],
    &[Key("audioUrl")],
    &[Key("audio_url")],
];

/// Human-readable failure message locations
pub const FAIL_REASON_PATHS: &[&[Seg]] = &[
    &[Key("data"), Key("errorMessage")],
    &[Key("data"), Key("msg")],
    &[Key("msg")],
    &[Key("message")],
];

/// Walk one key path into a JSON value
fn lookup<'a>(value: &'a Value, path: &[Seg]) -> Option<&'a Value> {
    let mut current = value;
    for seg in path {
        current = match seg {
            Seg::Key(k) => current.get(k)?,
            Seg::Idx(i) => current.get(i)?,
        };
    }
    Some(current)
}

/// Extract the first non-empty string found along an ordered path list
pub fn extract_string(value: &Value, paths: &[&[Seg]]) -> Option<String> {
    for path in paths {
        if let Some(found) = lookup(value, path).and_then(Value::as_str) {
            if !found.is_empty() {
                return Some(found.to_string());
            }
        }
    }
    None
}

/// Fold a provider status word into the local lifecycle enum
///
/// Covers record-info status codes (`PENDING`, `TEXT_SUCCESS`, `SUCCESS`,
/// `GENERATE_AUDIO_FAILED`, ...), callback types (`text`, `first`,
/// `complete`, `error`), and the loose words older variants used. Unknown
/// words return `None`; the caller decides whether that is ignorable.
pub fn parse_provider_status(word: &str) -> Option<TaskStatus> {
    match word.to_ascii_lowercase().as_str() {
        "pending" | "submitted" | "queued" => Some(TaskStatus::Submitted),
        "processing" | "running" | "text" | "first" | "text_success" | "first_success" => {
            Some(TaskStatus::Processing)
        }
        "complete" | "completed" | "success" | "succeeded" => Some(TaskStatus::Complete),
        "failed" | "error" | "create_task_failed" | "generate_audio_failed"
        | "callback_exception" | "sensitive_word_error" => Some(TaskStatus::Failed),
        _ => None,
    }
}
