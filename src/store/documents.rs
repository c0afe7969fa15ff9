use sqlx::{Row, SqlitePool};

use super::parse_timestamp;
use crate::core::errors::ApiError;
use crate::schemas::DocumentInfo;

/// Registry of ingested files. Records are immutable between insert and delete.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the id assigned by this insert.
    pub async fn register_document(&self, filename: &str) -> Result<i64, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let result = sqlx::query("INSERT INTO document_store (filename) VALUES (?1)")
            .bind(filename)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        let id = result.last_insert_rowid();

        tx.commit().await.map_err(ApiError::internal)?;
        tracing::info!(file_id = id, filename, "Registered document");
        Ok(id)
    }

    /// `false` when no record has this id.
    pub async fn remove_document(&self, id: i64) -> Result<bool, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        // Lookup and delete in one statement.
        let result = sqlx::query("DELETE FROM document_store WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        tx.commit().await.map_err(ApiError::internal)?;
        tracing::info!(file_id = id, "Removed document record");
        Ok(true)
    }

    /// Newest upload first.
    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT id, filename, upload_timestamp
            FROM document_store
            ORDER BY upload_timestamp DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn get_document(&self, id: i64) -> Result<Option<DocumentInfo>, ApiError> {
        let row = sqlx::query("SELECT id, filename, upload_timestamp FROM document_store WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.map(document_from_row)
            .transpose()
            .map_err(ApiError::internal)
    }
}

fn document_from_row(row: sqlx::sqlite::SqliteRow) -> Result<DocumentInfo, sqlx::Error> {
    let raw_timestamp: String = row.try_get("upload_timestamp")?;

    Ok(DocumentInfo {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        upload_timestamp: parse_timestamp(&raw_timestamp)?,
    })
}
