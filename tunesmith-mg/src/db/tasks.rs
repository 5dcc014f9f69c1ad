//! Task store: durable `music_tasks` rows with atomic upsert semantics
//!
//! All status mutation goes through SQL `INSERT ... ON CONFLICT DO UPDATE`
//! statements whose update arms embed the transition guard:
//!
//! - a terminal status (`complete`/`failed`) is never overwritten,
//! - between two terminal statuses the first one recorded wins,
//! - a stale `submitted` observation never rolls back `processing`,
//! - `audio_url` is only set alongside a `complete` transition and
//!   `fail_reason` only alongside `failed`.
//!
//! Keeping the guard inside the single upsert statement means concurrent
//! callback and poll writers cannot interleave a read-modify-write race;
//! SQLite serializes the whole row update.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tunesmith_common::{Error, Result};

use crate::models::{NewTask, StatusUpdate, Task, TaskStatus};

/// Insert the initial `submitted` row for a locally created task.
///
/// Idempotent: a duplicate submission with the same id refreshes the request
/// metadata but never touches `status` (re-submitting an id that already
/// completed must not reopen it).
pub async fn insert_submitted(pool: &SqlitePool, task: &NewTask) -> Result<Task> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO music_tasks (
            task_id, status, title, style, prompt, instrumental,
            created_at, updated_at
        ) VALUES (?1, 'submitted', ?2, ?3, ?4, ?5, ?6, ?6)
        ON CONFLICT(task_id) DO UPDATE SET
            title = excluded.title,
            style = excluded.style,
            prompt = excluded.prompt,
            instrumental = excluded.instrumental,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&task.task_id)
    .bind(&task.title)
    .bind(&task.style)
    .bind(&task.prompt)
    .bind(task.instrumental)
    .bind(&now)
    .execute(pool)
    .await?;

    require_task(pool, &task.task_id).await
}

/// Apply one callback/poll observation through the compare-and-set upsert.
///
/// Creates the row when absent (a callback can arrive before the local
/// submission lands, or for an id never submitted through this service) and
/// merges when present, with the terminal-wins guard. Returns the stored row
/// after the statement, which may differ from the requested update when a
/// terminal state was already recorded.
pub async fn apply_update(
    pool: &SqlitePool,
    task_id: &str,
    update: &StatusUpdate,
) -> Result<Task> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO music_tasks (
            task_id, provider_task_id, status, audio_url, fail_reason,
            raw_payload, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        ON CONFLICT(task_id) DO UPDATE SET
            status = CASE
                WHEN music_tasks.status IN ('complete', 'failed') THEN music_tasks.status
                WHEN music_tasks.status = 'processing' AND excluded.status = 'submitted'
                    THEN music_tasks.status
                ELSE excluded.status
            END,
            audio_url = CASE
                WHEN music_tasks.status IN ('complete', 'failed') THEN music_tasks.audio_url
                WHEN excluded.status = 'complete' THEN excluded.audio_url
                ELSE music_tasks.audio_url
            END,
            fail_reason = CASE
                WHEN music_tasks.status IN ('complete', 'failed') THEN music_tasks.fail_reason
                WHEN excluded.status = 'failed' THEN excluded.fail_reason
                ELSE music_tasks.fail_reason
            END,
            provider_task_id = COALESCE(music_tasks.provider_task_id, excluded.provider_task_id),
            raw_payload = COALESCE(excluded.raw_payload, music_tasks.raw_payload),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(task_id)
    .bind(&update.provider_task_id)
    .bind(update.status.as_str())
    .bind(&update.audio_url)
    .bind(&update.fail_reason)
    .bind(&update.raw_payload)
    .bind(&now)
    .execute(pool)
    .await?;

    require_task(pool, task_id).await
}

/// Fetch one task by id
pub async fn get_task(pool: &SqlitePool, task_id: &str) -> Result<Option<Task>> {
    let row = sqlx::query("SELECT * FROM music_tasks WHERE task_id = ?")
        .bind(task_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| row_to_task(&r)).transpose()
}

/// Fetch one task by the provider's own task id
///
/// Callbacks sometimes identify the job only by the provider id rather than
/// the `externalId` the gateway handed out.
pub async fn get_task_by_provider_id(
    pool: &SqlitePool,
    provider_task_id: &str,
) -> Result<Option<Task>> {
    let row = sqlx::query("SELECT * FROM music_tasks WHERE provider_task_id = ?")
        .bind(provider_task_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| row_to_task(&r)).transpose()
}

/// List all tasks, newest first
pub async fn list_tasks(pool: &SqlitePool) -> Result<Vec<Task>> {
    let rows = sqlx::query("SELECT * FROM music_tasks ORDER BY created_at DESC, task_id DESC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_task).collect()
}

/// Record the provider-side task id returned by the submit call
///
/// Only fills an empty column; an id learned earlier (e.g. from a racing
/// callback) is kept.
pub async fn set_provider_task_id(
    pool: &SqlitePool,
    task_id: &str,
    provider_task_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE music_tasks
        SET provider_task_id = COALESCE(provider_task_id, ?2),
            updated_at = ?3
        WHERE task_id = ?1
        "#,
    )
    .bind(task_id)
    .bind(provider_task_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the local path of a materialized audio asset
pub async fn set_local_path(pool: &SqlitePool, task_id: &str, local_path: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE music_tasks
        SET local_path = ?2,
            updated_at = ?3
        WHERE task_id = ?1
        "#,
    )
    .bind(task_id)
    .bind(local_path)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a task that is known to exist (post-upsert read-back)
async fn require_task(pool: &SqlitePool, task_id: &str) -> Result<Task> {
    get_task(pool, task_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Task {} missing after upsert", task_id)))
}

/// Map one `music_tasks` row into the domain type
fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status_text: String = row.get("status");
    let status: TaskStatus = status_text
        .parse()
        .map_err(|e: String| Error::Internal(format!("Corrupt status column: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(Task {
        task_id: row.get("task_id"),
        provider_task_id: row.get("provider_task_id"),
        status,
        audio_url: row.get("audio_url"),
        fail_reason: row.get("fail_reason"),
        local_path: row.get("local_path"),
        title: row.get("title"),
        style: row.get("style"),
        prompt: row.get("prompt"),
        instrumental: row.get("instrumental"),
        raw_payload: row.get("raw_payload"),
        created_at,
        updated_at,
    })
}
