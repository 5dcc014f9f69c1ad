//! Core domain types for the music generation gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure reason recorded when the poll attempt budget runs out
pub const REASON_POLL_TIMEOUT: &str = "poll_timeout";

/// Lifecycle state of one generation task
///
/// `Submitted` and `Processing` are in-flight; `Complete` and `Failed` are
/// terminal. A terminal row never transitions again (first terminal state
/// recorded wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Submitted,
    Processing,
    Complete,
    Failed,
}

impl TaskStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }

    /// Database/text representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Submitted => "submitted",
            TaskStatus::Processing => "processing",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(TaskStatus::Submitted),
            "processing" => Ok(TaskStatus::Processing),
            "complete" => Ok(TaskStatus::Complete),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("Unknown task status: {}", other)),
        }
    }
}

/// One external generation job tracked by the gateway
///
/// `audio_url` is non-null exactly when `status` is `complete`; `fail_reason`
/// is set when `status` is `failed`. `raw_payload` is the last-seen provider
/// response, kept for diagnostics and excluded from API responses.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_task_id: Option<String>,
    pub status: TaskStatus,
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub instrumental: bool,
    #[serde(skip_serializing)]
    pub raw_payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for the initial `submitted` row written before the provider call
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_id: String,
    pub title: Option<String>,
    pub style: Option<String>,
    pub prompt: String,
    pub instrumental: bool,
}

/// One state transition request from a callback or poll observation
///
/// Applied through the store's compare-and-set: a terminal stored status is
/// never overwritten, so constructing one of these never guarantees the
/// transition lands.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: TaskStatus,
    /// Set only alongside `Complete`
    pub audio_url: Option<String>,
    /// Set only alongside `Failed`
    pub fail_reason: Option<String>,
    /// Provider-side task id, recorded if the row does not have one yet
    pub provider_task_id: Option<String>,
    /// Full provider response for diagnostics
    pub raw_payload: Option<String>,
}

impl StatusUpdate {
    /// Transition to `processing` (or re-assert `submitted`)
    pub fn progress(status: TaskStatus, raw_payload: Option<String>) -> Self {
        Self {
            status,
            audio_url: None,
            fail_reason: None,
            provider_task_id: None,
            raw_payload,
        }
    }

    /// Terminal success with the provider's audio URL
    pub fn complete(audio_url: String, raw_payload: Option<String>) -> Self {
        Self {
            status: TaskStatus::Complete,
            audio_url: Some(audio_url),
            fail_reason: None,
            provider_task_id: None,
            raw_payload,
        }
    }

    /// Terminal failure with a reason code or provider message
    pub fn failed(reason: impl Into<String>, raw_payload: Option<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            audio_url: None,
            fail_reason: Some(reason.into()),
            provider_task_id: None,
            raw_payload,
        }
    }

    /// Attach the provider-side task id
    pub fn with_provider_task_id(mut self, id: impl Into<String>) -> Self {
        self.provider_task_id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Submitted.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Complete.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            TaskStatus::Submitted,
            TaskStatus::Processing,
            TaskStatus::Complete,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Ok(status));
        }
    }

    #[test]
    fn unknown_status_text_is_rejected() {
        assert!(TaskStatus::from_str("pending").is_err());
        assert!(TaskStatus::from_str("").is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Complete).unwrap(),
            "\"complete\""
        );
    }
}
