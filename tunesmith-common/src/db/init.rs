//! Database initialization
//!
//! Opens (creating if needed) the gateway SQLite database and applies the
//! idempotent schema. All services share one `music_tasks` table keyed by
//! task id.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows concurrent readers while callback/poll writers update rows
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_music_tasks_table(&pool).await?;

    Ok(pool)
}

/// Create the `music_tasks` table and its indexes (idempotent)
///
/// Timestamps are RFC 3339 text in UTC. `raw_payload` holds the last-seen
/// provider response verbatim for diagnostics.
pub async fn create_music_tasks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS music_tasks (
            task_id TEXT PRIMARY KEY,
            provider_task_id TEXT,
            status TEXT NOT NULL,
            audio_url TEXT,
            fail_reason TEXT,
            local_path TEXT,
            title TEXT,
            style TEXT,
            prompt TEXT,
            instrumental INTEGER NOT NULL DEFAULT 0,
            raw_payload TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_music_tasks_created_at
         ON music_tasks(created_at DESC)",
    )
    .execute(pool)
    .await?;

    // Callbacks sometimes carry only the provider's own task id
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_music_tasks_provider_task_id
         ON music_tasks(provider_task_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
