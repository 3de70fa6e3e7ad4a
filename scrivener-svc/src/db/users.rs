//! User database operations

use crate::models::User;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};

/// Insert or update a user
///
/// Ids come from the auth provider, so an existing id means the same person
/// with a possibly updated display name.
pub async fn upsert_user(pool: &SqlitePool, id: &str, name: &str) -> Result<User> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET name = excluded.name
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to upsert user")?;

    get_user(pool, id)
        .await?
        .context("User missing immediately after upsert")
}

/// Load a user by id
pub async fn get_user(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, created_at FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to load user")?;

    match row {
        Some(row) => Ok(Some(User::from_row(&row)?)),
        None => Ok(None),
    }
}

/// Delete a user, its transcripts (FK cascade) and their audio blobs
///
/// Returns false if the user did not exist. Blob removal happens after the
/// row cascade commits; a blob that is already gone is not an error.
pub async fn delete_user(pool: &SqlitePool, id: &str) -> Result<bool> {
    let blob_paths: Vec<String> =
        sqlx::query_scalar("SELECT file_path FROM transcripts WHERE user_id = ?")
            .bind(id)
            .fetch_all(pool)
            .await
            .context("Failed to collect transcript blobs for user")?;

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    for path in &blob_paths {
        match tokio::fs::remove_file(Path::new(path)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path, error = %e, "Failed to remove audio blob"),
        }
    }

    info!(user_id = %id, transcripts = blob_paths.len(), "Deleted user and owned transcripts");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::transcripts;
    use crate::models::NewTranscript;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        scrivener_common::db::init::create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates_name() {
        let pool = memory_pool().await;

        let user = upsert_user(&pool, "u1", "Alice").await.unwrap();
        assert_eq!(user.name, "Alice");

        let user = upsert_user(&pool, "u1", "Alice B.").await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.name, "Alice B.");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_get_user_missing_returns_none() {
        let pool = memory_pool().await;
        assert!(get_user(&pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_user_cascades_transcripts_and_blobs() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();

        upsert_user(&pool, "u1", "Alice").await.unwrap();

        let blob = dir.path().join("take1.wav");
        std::fs::write(&blob, b"RIFF").unwrap();

        transcripts::create_transcript(
            &pool,
            NewTranscript {
                user_id: "u1".to_string(),
                file_name: "take1.wav".to_string(),
                file_path: blob.to_string_lossy().to_string(),
                duration: 1.5,
            },
        )
        .await
        .unwrap();

        assert!(delete_user(&pool, "u1").await.unwrap());
        assert!(!blob.exists(), "blob must be removed with the user");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transcripts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0, "transcripts must cascade away");

        assert!(!delete_user(&pool, "u1").await.unwrap());
    }
}
