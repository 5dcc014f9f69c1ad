//! Result materialization
//!
//! Downloads the final audio asset for a completed task into the local
//! audio directory. Idempotent: a task whose asset was already materialized
//! returns the recorded path without a second download. A failed download
//! never touches the task's `complete` status (the generation succeeded
//! even if the local copy did not), so the caller can simply retry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::db::tasks;

/// Asset materialization errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx response from the asset host
    #[error("Asset fetch failed with status {status}")]
    Http { status: u16 },

    /// Transport failure or timeout while downloading
    #[error("Network error fetching asset: {0}")]
    Network(String),

    /// Local filesystem or task store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Downloads and persists final audio assets
#[derive(Debug, Clone)]
pub struct ResultFetcher {
    http: Client,
    audio_dir: PathBuf,
}

impl ResultFetcher {
    /// Create a fetcher writing into `audio_dir` with a download timeout
    pub fn new(audio_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            audio_dir: audio_dir.into(),
        }
    }

    /// Materialize one task's remote asset, returning the local path.
    ///
    /// Calling this twice for an already-materialized task performs exactly
    /// one remote download: the recorded path is returned as long as the
    /// file is still on disk.
    pub async fn materialize(
        &self,
        pool: &SqlitePool,
        task_id: &str,
        remote_url: &str,
    ) -> Result<PathBuf, FetchError> {
        // Recorded and still present: nothing to do
        let existing = tasks::get_task(pool, task_id)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?
            .and_then(|t| t.local_path);
        if let Some(path) = existing {
            let path = PathBuf::from(path);
            if path.exists() {
                debug!(task_id = %task_id, path = %path.display(), "Asset already materialized");
                return Ok(path);
            }
            warn!(
                task_id = %task_id,
                path = %path.display(),
                "Recorded asset file missing; re-downloading"
            );
        }

        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .map_err(|e| FetchError::Storage(format!("Failed to create audio dir: {}", e)))?;

        let final_path = self.audio_dir.join(format!("{}.mp3", task_id));
        let part_path = self.audio_dir.join(format!("{}.mp3.part", task_id));

        self.download_to(remote_url, &part_path).await?;

        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| FetchError::Storage(format!("Failed to finalize asset file: {}", e)))?;

        tasks::set_local_path(pool, task_id, &final_path.to_string_lossy())
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;

        info!(
            task_id = %task_id,
            path = %final_path.display(),
            "Audio asset materialized"
        );
        Ok(final_path)
    }

    /// Stream the remote asset to a partial file
    async fn download_to(&self, remote_url: &str, dest: &Path) -> Result<(), FetchError> {
        let response = self
            .http
            .get(remote_url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchError::Storage(format!("Failed to create asset file: {}", e)))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Network(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Storage(format!("Failed to write asset file: {}", e)))?;
        }

        file.flush()
            .await
            .map_err(|e| FetchError::Storage(format!("Failed to flush asset file: {}", e)))?;

        Ok(())
    }
}
