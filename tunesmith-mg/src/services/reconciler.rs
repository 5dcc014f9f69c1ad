//! Task lifecycle reconciliation
//!
//! The reconciler owns the `submitted → processing → {complete | failed}`
//! state machine. It accepts submissions, applies callback notifications,
//! and spawns the per-task polling fallback. All state mutation funnels
//! through the task store's compare-and-set upsert, so callback and poll
//! observations can race freely: a terminal status always wins over a
//! non-terminal one, and the first terminal status recorded sticks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tunesmith_common::config::GatewayConfig;
use uuid::Uuid;

use crate::db::tasks;
use crate::models::{NewTask, StatusUpdate, Task, TaskStatus};
use crate::services::extract::{
    extract_string, parse_provider_status, AUDIO_URL_PATHS, FAIL_REASON_PATHS, STATUS_PATHS,
    TASK_ID_PATHS,
};
use crate::services::poller;
use crate::services::provider::{GenerateSpec, ProviderClient, ProviderError};

/// Errors surfaced by reconciler operations
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Provider submit/poll failure
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Storage failure (task store unavailable or corrupt)
    #[error(transparent)]
    Storage(#[from] tunesmith_common::Error),

    /// Unknown task id
    #[error("Task not found: {0}")]
    NotFound(String),
}

/// One inbound generation request, after HTTP-layer validation
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub prompt: String,
    pub style: Option<String>,
    pub title: Option<String>,
    pub instrumental: bool,
}

/// Outcome of one callback notification
#[derive(Debug, Clone)]
pub enum CallbackDisposition {
    /// The callback mapped to a task and was applied through the store
    Saved { task_id: String, status: TaskStatus },
    /// The payload was unusable; acknowledged so the provider stops retrying
    Ignored { reason: String },
}

/// The task lifecycle reconciler
pub struct Reconciler {
    db: SqlitePool,
    provider: Arc<ProviderClient>,
    config: Arc<GatewayConfig>,
    /// Cancellation token per active polling loop, keyed by task id
    pollers: Arc<RwLock<HashMap<String, CancellationToken>>>,
    /// Root token cancelled on service shutdown
    shutdown: CancellationToken,
}

impl Reconciler {
    pub fn new(db: SqlitePool, provider: Arc<ProviderClient>, config: Arc<GatewayConfig>) -> Self {
        Self {
            db,
            provider,
            config,
            pollers: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Submit a new generation request.
    ///
    /// The `submitted` row is written before the provider call so an early
    /// callback always finds a record. Provider failures are recorded on the
    /// row and then surfaced to the caller.
    pub async fn submit(&self, params: GenerateParams) -> Result<Task, ReconcileError> {
        let task_id = Uuid::new_v4().to_string();

        let instrumental = if self.config.force_vocals && params.instrumental {
            info!(
                task_id = %task_id,
                "force_vocals enabled: overriding instrumental=true to false"
            );
            false
        } else {
            params.instrumental
        };

        let new_task = NewTask {
            task_id: task_id.clone(),
            title: params.title.clone(),
            style: params.style.clone(),
            prompt: params.prompt.clone(),
            instrumental,
        };
        tasks::insert_submitted(&self.db, &new_task).await?;

        let spec = GenerateSpec {
            prompt: params.prompt,
            style: params.style,
            title: params.title,
            instrumental,
            callback_url: self.config.callback_url.clone(),
            external_id: task_id.clone(),
        };

        let provider_task_id = match self.provider.submit(&spec).await {
            Ok(id) => id,
            Err(e) => {
                let update = StatusUpdate::failed(e.to_string(), None);
                if let Err(db_err) = tasks::apply_update(&self.db, &task_id, &update).await {
                    warn!(
                        task_id = %task_id,
                        error = %db_err,
                        "Failed to record submission failure"
                    );
                }
                return Err(e.into());
            }
        };

        tasks::set_provider_task_id(&self.db, &task_id, &provider_task_id).await?;
        info!(
            task_id = %task_id,
            provider_task_id = %provider_task_id,
            "Generation task submitted"
        );

        self.spawn_poller(task_id.clone(), provider_task_id).await;

        self.status(&task_id).await
    }

    /// Apply one provider callback notification.
    ///
    /// Payloads with no recognizable task id or status are acknowledged as
    /// ignored (the provider must not retry forever), while
    /// usable payloads go through the store's compare-and-set. An unknown
    /// task id creates a record from the callback alone; callbacks are the
    /// ground truth for completion even without a prior local row.
    pub async fn handle_callback(
        &self,
        payload: Value,
    ) -> Result<CallbackDisposition, ReconcileError> {
        let Some(raw_id) = extract_string(&payload, TASK_ID_PATHS) else {
            warn!("Callback payload has no recognizable task id; ignoring");
            return Ok(CallbackDisposition::Ignored {
                reason: "no task id in payload".to_string(),
            });
        };

        let Some(status_word) = extract_string(&payload, STATUS_PATHS) else {
            warn!(callback_id = %raw_id, "Callback payload has no status field; ignoring");
            return Ok(CallbackDisposition::Ignored {
                reason: "no status in payload".to_string(),
            });
        };

        let Some(status) = parse_provider_status(&status_word) else {
            warn!(
                callback_id = %raw_id,
                status_word = %status_word,
                "Callback status word not recognized; ignoring"
            );
            return Ok(CallbackDisposition::Ignored {
                reason: format!("unrecognized status word: {}", status_word),
            });
        };

        let audio_url = extract_string(&payload, AUDIO_URL_PATHS);
        let raw_payload = serde_json::to_string(&payload).ok();

        // Resolve the canonical row: the echoed externalId is our primary
        // key; failing that, the provider's own id; failing both, this is an
        // implicit creation keyed by whatever id the callback carried.
        let (task_id, implicit_provider_id) = match tasks::get_task(&self.db, &raw_id).await? {
            Some(t) => (t.task_id, None),
            None => match tasks::get_task_by_provider_id(&self.db, &raw_id).await? {
                Some(t) => (t.task_id, None),
                None => (raw_id.clone(), Some(raw_id.clone())),
            },
        };

        let update = match (status, audio_url) {
            (TaskStatus::Complete, Some(url)) => StatusUpdate::complete(url, raw_payload),
            (TaskStatus::Complete, None) => {
                warn!(task_id = %task_id, "Complete callback without an audio URL; ignoring");
                return Ok(CallbackDisposition::Ignored {
                    reason: "complete callback without audio url".to_string(),
                });
            }
            (TaskStatus::Failed, _) => {
                let reason = extract_string(&payload, FAIL_REASON_PATHS)
                    .unwrap_or_else(|| status_word.clone());
                StatusUpdate::failed(reason, raw_payload)
            }
            (in_flight, _) => StatusUpdate::progress(in_flight, raw_payload),
        };
        let update = match implicit_provider_id {
            Some(pid) => update.with_provider_task_id(pid),
            None => update,
        };

        let stored = tasks::apply_update(&self.db, &task_id, &update).await?;

        // The stored status reflects the tie-break: a poll may have reached
        // a terminal state first, in which case this callback changed nothing
        if stored.status.is_terminal() {
            self.cancel_poller(&task_id).await;
        }

        info!(
            task_id = %task_id,
            callback_status = %status,
            stored_status = %stored.status,
            "Callback applied"
        );

        Ok(CallbackDisposition::Saved {
            task_id,
            status: stored.status,
        })
    }

    /// Read one task's authoritative state
    pub async fn status(&self, task_id: &str) -> Result<Task, ReconcileError> {
        tasks::get_task(&self.db, task_id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(task_id.to_string()))
    }

    /// List all tasks, newest first
    pub async fn list(&self) -> Result<Vec<Task>, ReconcileError> {
        Ok(tasks::list_tasks(&self.db).await?)
    }

    /// Resume polling for in-flight tasks from a previous run.
    ///
    /// Rows still `submitted`/`processing` at startup lost their polling
    /// loops when the process died. Tasks with a known provider id get a
    /// fresh loop; tasks without one cannot be polled and are left for a
    /// callback to resolve.
    pub async fn recover_inflight(&self) -> Result<usize, ReconcileError> {
        let mut resumed = 0;
        for task in tasks::list_tasks(&self.db).await? {
            if task.status.is_terminal() {
                continue;
            }
            match task.provider_task_id {
                Some(provider_task_id) => {
                    self.spawn_poller(task.task_id, provider_task_id).await;
                    resumed += 1;
                }
                None => {
                    warn!(
                        task_id = %task.task_id,
                        "In-flight task has no provider id; awaiting callback"
                    );
                }
            }
        }
        if resumed > 0 {
            info!(count = resumed, "Resumed polling for in-flight tasks");
        }
        Ok(resumed)
    }

    /// Spawn the bounded polling loop for one task
    async fn spawn_poller(&self, task_id: String, provider_task_id: String) {
        let token = self.shutdown.child_token();
        self.pollers
            .write()
            .await
            .insert(task_id.clone(), token.clone());

        let db = self.db.clone();
        let provider = Arc::clone(&self.provider);
        let pollers = Arc::clone(&self.pollers);
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        let max_attempts = self.config.poll_max_attempts;

        tokio::spawn(async move {
            poller::poll_until_resolved(
                &db,
                &provider,
                interval,
                max_attempts,
                &task_id,
                &provider_task_id,
                &token,
            )
            .await;
            pollers.write().await.remove(&task_id);
        });
    }

    /// Stop the polling loop for one task, if any
    async fn cancel_poller(&self, task_id: &str) {
        if let Some(token) = self.pollers.write().await.remove(task_id) {
            token.cancel();
        }
    }

    /// Cancel every polling loop; called on service shutdown
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
