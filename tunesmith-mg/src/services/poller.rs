//! Polling fallback for tasks whose callbacks never arrive
//!
//! One loop per task, independent of every other task's loop. The loop is
//! bounded three ways: it stops when a terminal state is observed (locally
//! or from the provider), when the attempt budget is exhausted (the task is
//! then failed with reason `poll_timeout`), and when the cancellation token
//! fires (callback resolved the task first, or the service is shutting
//! down).

use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::db::tasks;
use crate::models::{StatusUpdate, TaskStatus, REASON_POLL_TIMEOUT};
use crate::services::extract::{extract_string, FAIL_REASON_PATHS};
use crate::services::provider::ProviderClient;

/// Poll the provider until the task resolves or the budget runs out.
///
/// Transient provider errors count against the attempt budget and are
/// otherwise retried; they are never surfaced beyond the log, since nobody
/// is listening to a background loop.
pub async fn poll_until_resolved(
    db: &SqlitePool,
    provider: &ProviderClient,
    interval: Duration,
    max_attempts: u32,
    task_id: &str,
    provider_task_id: &str,
    cancel: &CancellationToken,
) {
    let mut attempts: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(task_id = %task_id, "Polling cancelled");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        // A callback may have resolved the task while we slept
        match tasks::get_task(db, task_id).await {
            Ok(Some(task)) if task.status.is_terminal() => {
                debug!(
                    task_id = %task_id,
                    status = %task.status,
                    "Task already terminal; stopping poll loop"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Poll loop could not read task state");
            }
        }

        attempts += 1;

        match provider.poll(provider_task_id).await {
            Ok(outcome) => {
                let raw_payload = serde_json::to_string(&outcome.raw).ok();
                let update = match (outcome.status, outcome.audio_url) {
                    (TaskStatus::Complete, Some(url)) => StatusUpdate::complete(url, raw_payload),
                    (TaskStatus::Failed, _) => {
                        let reason = extract_string(&outcome.raw, FAIL_REASON_PATHS)
                            .unwrap_or_else(|| "provider reported failure".to_string());
                        StatusUpdate::failed(reason, raw_payload)
                    }
                    // PollOutcome guarantees Complete carries a URL, so the
                    // remaining statuses are all in-flight
                    (status, _) => StatusUpdate::progress(status, raw_payload),
                };

                match tasks::apply_update(db, task_id, &update).await {
                    Ok(stored) if stored.status.is_terminal() => {
                        debug!(
                            task_id = %task_id,
                            status = %stored.status,
                            attempts = attempts,
                            "Task resolved by polling"
                        );
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "Failed to store poll result");
                    }
                }
            }
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    attempt = attempts,
                    error = %e,
                    "Poll attempt failed; will retry"
                );
            }
        }

        if attempts >= max_attempts {
            warn!(
                task_id = %task_id,
                attempts = attempts,
                "Poll attempt budget exhausted; marking task failed"
            );
            let update = StatusUpdate::failed(REASON_POLL_TIMEOUT, None);
            // A racing callback may have already recorded a terminal state;
            // the compare-and-set keeps it
            if let Err(e) = tasks::apply_update(db, task_id, &update).await {
                warn!(task_id = %task_id, error = %e, "Failed to record poll timeout");
            }
            return;
        }
    }
}
