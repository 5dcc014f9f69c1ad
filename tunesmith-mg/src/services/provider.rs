//! Generation provider client
//!
//! Wraps the provider's music generation API: submit a generation job, poll
//! a job's record-info. Authenticated with a bearer token; every request
//! carries the client-level timeout so a hung provider call can never block
//! another task's polling loop.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::TaskStatus;
use crate::services::extract::{
    extract_string, parse_provider_status, AUDIO_URL_PATHS, PROVIDER_TASK_ID_PATHS, STATUS_PATHS,
};

/// Submit endpoint path
const GENERATE_PATH: &str = "/api/v1/generate/music";

/// Status/record-info endpoint path
const RECORD_INFO_PATH: &str = "/api/v1/generate/record-info";

/// Provider client errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-2xx response from the provider
    #[error("Provider API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Request exceeded the configured timeout
    #[error("Provider request timed out")]
    Timeout,

    /// Transport-level failure (DNS, connect, TLS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Response parsed as JSON but matched none of the known shapes
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// One generation request as sent to the provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSpec {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub instrumental: bool,
    /// Where the provider should POST progress callbacks
    #[serde(rename = "callBackUrl", skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Our task id, echoed back in callbacks
    pub external_id: String,
}

/// Normalized result of one record-info poll
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub status: TaskStatus,
    /// Present exactly when `status` is `Complete`
    pub audio_url: Option<String>,
    /// Full response body for diagnostics
    pub raw: Value,
}

/// HTTP client for the generation provider
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ProviderClient {
    /// Create a client against `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Submit a generation job; returns the provider's task id
    pub async fn submit(&self, spec: &GenerateSpec) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.base_url, GENERATE_PATH);
        debug!(external_id = %spec.external_id, "Submitting generation request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(spec)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let body = check_status(response).await?;

        extract_string(&body, PROVIDER_TASK_ID_PATHS).ok_or_else(|| {
            ProviderError::MalformedResponse(format!(
                "No task id in submit response: {}",
                truncate(&body.to_string(), 400)
            ))
        })
    }

    /// Poll the provider for one task's current state
    pub async fn poll(&self, provider_task_id: &str) -> Result<PollOutcome, ProviderError> {
        let url = format!("{}{}", self.base_url, RECORD_INFO_PATH);
        debug!(provider_task_id = %provider_task_id, "Polling record-info");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("taskId", provider_task_id)])
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let body = check_status(response).await?;

        let status_word = extract_string(&body, STATUS_PATHS).ok_or_else(|| {
            ProviderError::MalformedResponse(format!(
                "No status in record-info response: {}",
                truncate(&body.to_string(), 400)
            ))
        })?;

        let status = parse_provider_status(&status_word).ok_or_else(|| {
            ProviderError::MalformedResponse(format!("Unknown status word: {}", status_word))
        })?;

        let audio_url = extract_string(&body, AUDIO_URL_PATHS);

        // A completed job without an audio URL violates the result contract
        if status == TaskStatus::Complete && audio_url.is_none() {
            return Err(ProviderError::MalformedResponse(
                "Complete record-info response without an audio URL".to_string(),
            ));
        }

        Ok(PollOutcome {
            status,
            audio_url: if status == TaskStatus::Complete {
                audio_url
            } else {
                None
            },
            raw: body,
        })
    }
}

/// Map a non-2xx response to `Api`, otherwise parse the JSON body
async fn check_status(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body: truncate(&body, 1000),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ProviderError::MalformedResponse(format!("Response is not JSON: {}", e)))
}

/// Bound error-message payloads so provider bodies cannot flood the logs
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_spec_serializes_provider_field_names() {
        let spec = GenerateSpec {
            prompt: "lofi beat".to_string(),
            style: Some("lofi".to_string()),
            title: None,
            instrumental: true,
            callback_url: Some("https://me.example/callback".to_string()),
            external_id: "uuid-1".to_string(),
        };

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["prompt"], "lofi beat");
        assert_eq!(value["instrumental"], true);
        assert_eq!(value["callBackUrl"], "https://me.example/callback");
        assert_eq!(value["externalId"], "uuid-1");
        // Unset optionals are omitted entirely
        assert!(value.get("title").is_none());
    }

    #[test]
    fn generate_spec_omits_callback_url_when_unset() {
        let spec = GenerateSpec {
            prompt: "p".to_string(),
            style: None,
            title: None,
            instrumental: false,
            callback_url: None,
            external_id: "uuid-2".to_string(),
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert!(value.get("callBackUrl").is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate(s, 3);
        assert!(t.ends_with("..."));

        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn submit_response_id_extraction_ignores_request_id() {
        // Submit responses carry a request-scoped "id"; only taskId shapes count
        let body = json!({"id": "req-1", "data": {"taskId": "prov-9"}});
        assert_eq!(
            extract_string(&body, PROVIDER_TASK_ID_PATHS).as_deref(),
            Some("prov-9")
        );

        let body = json!({"id": "req-1"});
        assert_eq!(extract_string(&body, PROVIDER_TASK_ID_PATHS), None);
    }
}
