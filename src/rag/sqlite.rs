//! SQLite-backed passage store.
//!
//! Passages and their embeddings live in a dedicated SQLite file; search is
//! brute-force cosine similarity over every stored vector. Embeddings come
//! from the hosted endpoint via [`LlmProvider::embed`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{Passage, VectorStore};
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;

const EMBED_BATCH_SIZE: usize = 64;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
    embedder: Arc<dyn LlmProvider>,
    embedding_model: String,
}

impl SqliteVectorStore {
    pub async fn open(
        db_path: impl AsRef<Path>,
        embedder: Arc<dyn LlmProvider>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self {
            pool,
            db_path,
            embedder,
            embedding_model: embedding_model.into(),
        };
        store.init_schema().await?;
        store.reset_if_model_changed().await?;
        Ok(store)
    }

    pub async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_passages")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_passages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_passages_file ON rag_passages(file_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Vectors from another embedding model are not comparable; drop them.
    async fn reset_if_model_changed(&self) -> Result<(), ApiError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM rag_meta WHERE key = 'embedding_model'")
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        if stored.as_deref() == Some(self.embedding_model.as_str()) {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        if let Some(previous) = &stored {
            let dropped = sqlx::query("DELETE FROM rag_passages")
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?
                .rows_affected();
            tracing::warn!(
                previous = %previous,
                current = %self.embedding_model,
                dropped,
                "Embedding model changed; cleared passage index"
            );
        }
        sqlx::query(
            "INSERT OR REPLACE INTO rag_meta (key, value, updated_at)
             VALUES ('embedding_model', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(&self.embedding_model)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_passage(row: &sqlx::sqlite::SqliteRow) -> Result<Passage, sqlx::Error> {
        let chunk_index: i64 = row.try_get("chunk_index")?;
        Ok(Passage {
            file_id: row.try_get("file_id")?,
            filename: row.try_get("filename")?,
            chunk_index: chunk_index.max(0) as usize,
            content: row.try_get("content")?,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add_passages(&self, passages: Vec<Passage>) -> Result<usize, ApiError> {
        if passages.is_empty() {
            return Ok(0);
        }

        let mut embeddings = Vec::with_capacity(passages.len());
        for batch in passages.chunks(EMBED_BATCH_SIZE) {
            let inputs: Vec<String> = batch.iter().map(|p| p.content.clone()).collect();
            embeddings.extend(self.embedder.embed(&inputs, &self.embedding_model).await?);
        }
        if embeddings.len() != passages.len() {
            return Err(ApiError::Upstream(format!(
                "embedder returned {} vectors for {} passages",
                embeddings.len(),
                passages.len()
            )));
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for (passage, embedding) in passages.iter().zip(embeddings.iter()) {
            sqlx::query(
                "INSERT INTO rag_passages (file_id, filename, chunk_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(passage.file_id)
            .bind(&passage.filename)
            .bind(passage.chunk_index as i64)
            .bind(&passage.content)
            .bind(Self::serialize_embedding(embedding))
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }
        tx.commit().await.map_err(ApiError::internal)?;

        Ok(passages.len())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Passage>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[query.to_string()], &self.embedding_model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Upstream("no embedding returned for query".to_string()))?;

        let rows = sqlx::query(
            "SELECT file_id, filename, chunk_index, content, embedding FROM rag_passages",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding").map_err(ApiError::internal)?;
            let score = Self::cosine_similarity(&query_embedding, &Self::deserialize_embedding(&blob));
            scored.push((score, Self::row_to_passage(row).map_err(ApiError::internal)?));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(k).map(|(_, passage)| passage).collect())
    }

    async fn delete_document(&self, file_id: i64) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM rag_passages WHERE file_id = ?1")
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!(path = %self.db_path.display(), "Vector store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRequest;
    use crate::schemas::ModelName;

    const VOCAB: [&str; 3] = ["rust", "python", "sqlite"];

    /// Bag-of-words over a tiny vocabulary.
    struct KeywordEmbedder;

    #[async_trait]
    impl LlmProvider for KeywordEmbedder {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn chat(&self, _request: ChatRequest, _model: ModelName) -> Result<String, ApiError> {
            Err(ApiError::Upstream("chat not available".to_string()))
        }

        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|word| lower.matches(word).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn passage(file_id: i64, chunk_index: usize, content: &str) -> Passage {
        Passage {
            file_id,
            filename: format!("{}.txt", file_id),
            chunk_index,
            content: content.to_string(),
        }
    }

    async fn open_in(dir: &Path, model: &str) -> SqliteVectorStore {
        SqliteVectorStore::open(dir.join("vectors.db"), Arc::new(KeywordEmbedder), model)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_caps_at_k() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_in(tmp.path(), "kw-v1").await;

        store
            .add_passages(vec![
                passage(1, 0, "Python tips and tricks"),
                passage(1, 1, "Rust ownership; rust borrowing"),
                passage(2, 0, "SQLite pragmas"),
            ])
            .await
            .unwrap();

        let hits = store.similarity_search("how does rust work", 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Rust ownership; rust borrowing");
        assert_eq!(hits[0].file_id, 1);
        assert_eq!(hits[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn delete_document_only_touches_its_passages() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_in(tmp.path(), "kw-v1").await;

        store
            .add_passages(vec![passage(1, 0, "rust"), passage(1, 1, "python"), passage(2, 0, "sqlite")])
            .await
            .unwrap();

        assert_eq!(store.delete_document(1).await.unwrap(), 2);
        assert_eq!(store.delete_document(1).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reopening_with_new_model_clears_index() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_in(tmp.path(), "kw-v1").await;
        store.add_passages(vec![passage(1, 0, "rust")]).await.unwrap();
        store.close().await;

        let same = open_in(tmp.path(), "kw-v1").await;
        assert_eq!(same.count().await.unwrap(), 1);
        same.close().await;

        let changed = open_in(tmp.path(), "kw-v2").await;
        assert_eq!(changed.count().await.unwrap(), 0);
    }

    /// Drops the last vector of every batch.
    struct ShortEmbedder;

    #[async_trait]
    impl LlmProvider for ShortEmbedder {
        fn name(&self) -> &str {
            "short"
        }

        async fn chat(&self, _request: ChatRequest, _model: ModelName) -> Result<String, ApiError> {
            Err(ApiError::Upstream("chat not available".to_string()))
        }

        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn missing_embeddings_fail_without_storing_anything() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(tmp.path().join("vectors.db"), Arc::new(ShortEmbedder), "short-v1")
            .await
            .unwrap();

        let err = store
            .add_passages(vec![passage(1, 0, "rust"), passage(1, 1, "python")])
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Upstream(ref msg) if msg.contains("1 vectors for 2 passages")));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn open_creates_missing_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("index").join("v1").join("vectors.db");

        let store = SqliteVectorStore::open(&nested, Arc::new(KeywordEmbedder), "kw-v1")
            .await
            .unwrap();
        store.add_passages(vec![passage(1, 0, "rust")]).await.unwrap();

        assert!(nested.exists());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[test]
    fn embedding_blob_round_trips_and_cosine_handles_degenerate_input() {
        let vector = vec![0.5, -1.25, 3.0];
        let blob = SqliteVectorStore::serialize_embedding(&vector);
        assert_eq!(SqliteVectorStore::deserialize_embedding(&blob), vector);

        assert_eq!(SqliteVectorStore::cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(SqliteVectorStore::cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!(SqliteVectorStore::cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) > 0.99);
    }
}
