//! Keeps the document registry and the passage index in step.

use std::sync::Arc;

use super::splitter::TextSplitter;
use super::store::{Passage, VectorStore};
use crate::core::errors::ApiError;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct Ingestor {
    documents: DocumentStore,
    vector_store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
}

impl Ingestor {
    pub fn new(documents: DocumentStore, vector_store: Arc<dyn VectorStore>, splitter: TextSplitter) -> Self {
        Self {
            documents,
            vector_store,
            splitter,
        }
    }

    /// Registers `filename`, indexes its chunks and returns the new file id.
    ///
    /// If indexing fails the registry record is removed again before the
    /// error is returned.
    pub async fn ingest(&self, filename: &str, content: &str) -> Result<i64, ApiError> {
        let file_id = self.documents.register_document(filename).await?;

        let passages: Vec<Passage> = self
            .splitter
            .split(content)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, chunk)| Passage {
                file_id,
                filename: filename.to_string(),
                chunk_index,
                content: chunk,
            })
            .collect();

        match self.vector_store.add_passages(passages).await {
            Ok(indexed) => {
                tracing::info!(file_id, filename, chunks = indexed, "Document indexed");
                Ok(file_id)
            }
            Err(err) => {
                tracing::error!(file_id, filename, error = %err, "Indexing failed; rolling back document record");
                if let Err(cleanup) = self.vector_store.delete_document(file_id).await {
                    tracing::warn!(file_id, error = %cleanup, "Failed to purge partial passages");
                }
                if let Err(cleanup) = self.documents.remove_document(file_id).await {
                    tracing::warn!(file_id, error = %cleanup, "Failed to remove document record");
                }
                Err(err)
            }
        }
    }

    /// Purges the passages of `file_id`, then its registry record.
    /// Returns false when no record existed.
    pub async fn delete(&self, file_id: i64) -> Result<bool, ApiError> {
        let purged = self.vector_store.delete_document(file_id).await?;
        let removed = self.documents.remove_document(file_id).await?;
        tracing::info!(file_id, purged, removed, "Document delete processed");
        Ok(removed)
    }
}
