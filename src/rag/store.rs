//! VectorStore / Retriever traits — the seam to the passage index.
//!
//! The bundled implementation is `SqliteVectorStore` in the `sqlite` module;
//! anything that can rank passages for a query string can stand in for it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A chunk of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Id of the owning `document_store` record.
    pub file_id: i64,
    pub filename: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    pub content: String,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Index passages; returns how many were stored.
    async fn add_passages(&self, passages: Vec<Passage>) -> Result<usize, ApiError>;

    /// Up to `k` passages most relevant to `query`, best first.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Passage>, ApiError>;

    /// Drop every passage of a document; returns how many were removed.
    async fn delete_document(&self, file_id: i64) -> Result<usize, ApiError>;

    /// Release backing resources at shutdown.
    async fn close(&self) {}
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, ApiError>;
}

/// Retriever bound to a store with a fixed result count.
#[derive(Clone)]
pub struct VectorStoreRetriever {
    store: Arc<dyn VectorStore>,
    k: usize,
}

impl VectorStoreRetriever {
    pub fn k(&self) -> usize {
        self.k
    }
}

#[async_trait]
impl Retriever for VectorStoreRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, ApiError> {
        let mut passages = self.store.similarity_search(query, self.k).await?;
        passages.truncate(self.k);
        Ok(passages)
    }
}

pub fn as_retriever(store: Arc<dyn VectorStore>, k: usize) -> VectorStoreRetriever {
    VectorStoreRetriever { store, k }
}
