//! Durable chat-log and document-registry tables in one SQLite file.

mod documents;
mod history;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::core::errors::ApiError;

pub use documents::DocumentStore;
pub use history::ChatLogStore;

const SCHEMA_VERSION: i64 = 1;

/// Timestamp format written by the column defaults; fixed width so text order is time order.
pub(crate) const SQL_NOW: &str = "STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')";

#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_path: impl AsRef<Path>, max_connections: u32) -> Result<Self, ApiError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::internal)?;

        let database = Self { db_path, pool };
        database.init_schema().await?;
        tracing::info!(path = %database.db_path.display(), "Database ready");
        Ok(database)
    }

    pub fn chat_logs(&self) -> ChatLogStore {
        ChatLogStore::new(self.pool.clone())
    }

    pub fn documents(&self) -> DocumentStore {
        DocumentStore::new(self.pool.clone())
    }

    /// Waits for checked-out connections to return, then closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(path = %self.db_path.display(), "Database closed");
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query(&format!(
            "\
            CREATE TABLE IF NOT EXISTS application_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                user_query TEXT NOT NULL,
                gpt_response TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT ({})
            )",
            SQL_NOW
        ))
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(&format!(
            "\
            CREATE TABLE IF NOT EXISTS document_store (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                upload_timestamp TEXT NOT NULL DEFAULT ({})
            )",
            SQL_NOW
        ))
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_application_logs_session \
             ON application_logs(session_id, created_at, id)",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_document_store_uploaded \
             ON document_store(upload_timestamp DESC, id DESC)",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
        sqlx::query(&pragma)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
pub(crate) async fn test_database() -> (tempfile::TempDir, Database) {
    let tmp = tempfile::tempdir().unwrap();
    let database = Database::connect(tmp.path().join("rag.db"), 4).await.unwrap();
    (tmp, database)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_creates_schema_and_is_idempotent() {
        let (tmp, database) = test_database().await;
        database.close().await;

        let reopened = Database::connect(tmp.path().join("rag.db"), 2).await.unwrap();
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&reopened.pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name IN ('application_logs', 'document_store') ORDER BY name",
        )
        .fetch_all(&reopened.pool)
        .await
        .unwrap();
        assert_eq!(tables, vec!["application_logs", "document_store"]);
    }

    #[test]
    fn parses_column_default_timestamps() {
        let ts = parse_timestamp("2025-08-29T12:34:56.789Z").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 789);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
