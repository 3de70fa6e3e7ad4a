//! Database initialization
//!
//! Opens (or creates) the SQLite database, applies connection pragmas and
//! creates the schema idempotently so a fresh install needs no manual setup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
///
/// Pragmas are set through the connect options so every pooled connection
/// gets them: foreign keys (cascade deletes depend on it), WAL for
/// concurrent readers with one writer, busy timeout for write contention.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent - safe to call multiple times)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_transcripts_table(pool).await?;
    create_jobs_table(pool).await?;
    create_settings_table(pool).await?;
    Ok(())
}

/// Create the users table
///
/// User ids are externally issued (auth provider subject ids), so the
/// primary key is caller-supplied text rather than a generated id.
pub async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the transcripts table
///
/// `id` is system-assigned and monotonic (AUTOINCREMENT). `status` is
/// constrained to the three lifecycle states; rows cascade away with their
/// owning user.
pub async fn create_transcripts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transcripts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            text TEXT NOT NULL DEFAULT '',
            duration REAL NOT NULL,
            language TEXT,
            status TEXT NOT NULL DEFAULT 'processing'
                CHECK (status IN ('processing', 'completed', 'failed')),
            job_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (duration >= 0.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transcripts_user_id ON transcripts(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transcripts_job_id ON transcripts(job_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the jobs table (durable work queue)
///
/// The retry policy lives on the row (`attempts`, `max_attempts`,
/// `backoff_ms`, `run_after`) and is interpreted by the queue's redelivery
/// logic, not by workers re-throwing.
pub async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending'
                CHECK (state IN ('pending', 'running', 'succeeded', 'failed')),
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            backoff_ms INTEGER NOT NULL,
            run_after INTEGER NOT NULL,
            result TEXT,
            last_error TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (attempts >= 0),
            CHECK (max_attempts > 0),
            CHECK (backoff_ms >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_claimable ON jobs(state, run_after)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values and resets NULL
/// values back to defaults.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Upload limits
    ensure_setting(pool, "max_upload_bytes", "1073741824").await?; // 1 GiB

    // Worker pool and retry policy
    ensure_setting(pool, "worker_count", "2").await?;
    ensure_setting(pool, "job_max_attempts", "4").await?; // 1 initial + 3 retries
    ensure_setting(pool, "job_backoff_ms", "10000").await?;
    ensure_setting(pool, "queue_poll_interval_ms", "500").await?;

    // HTTP server settings
    ensure_setting(pool, "http_host", "127.0.0.1").await?;
    ensure_setting(pool, "http_port", "5740").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read a setting value, falling back to the supplied default when missing
pub async fn get_setting_or(pool: &SqlitePool, key: &str, default_value: &str) -> Result<String> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?
        .flatten();

    Ok(value.unwrap_or_else(|| default_value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let pool = memory_pool().await;
        // Second run must not fail
        create_schema(&pool).await.expect("second create_schema failed");
    }

    #[tokio::test]
    async fn test_transcript_status_check_constraint() {
        let pool = memory_pool().await;

        sqlx::query("INSERT INTO users (id, name) VALUES ('u1', 'Alice')")
            .execute(&pool)
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO transcripts (user_id, file_name, file_path, duration, status)
             VALUES ('u1', 'a.wav', '/tmp/a.wav', 1.0, 'bogus')",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "invalid status must be rejected");
    }

    #[tokio::test]
    async fn test_ensure_setting_creates_and_preserves() {
        let pool = memory_pool().await;

        ensure_setting(&pool, "worker_count", "2").await.unwrap();
        assert_eq!(get_setting_or(&pool, "worker_count", "9").await.unwrap(), "2");

        // Explicit value survives re-initialization
        sqlx::query("UPDATE settings SET value = '7' WHERE key = 'worker_count'")
            .execute(&pool)
            .await
            .unwrap();
        ensure_setting(&pool, "worker_count", "2").await.unwrap();
        assert_eq!(get_setting_or(&pool, "worker_count", "9").await.unwrap(), "7");
    }
}
