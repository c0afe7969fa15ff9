//! Retrieval-augmented answering.
//!
//! - `store`: passage types and the `VectorStore` / `Retriever` seams
//! - `sqlite`: the bundled embedding index
//! - `splitter` + `ingest`: turning uploaded text into indexed passages
//! - `chain`: history-aware question answering over a retriever

pub mod chain;
pub mod ingest;
pub mod splitter;
pub mod sqlite;
pub mod store;

pub use chain::{ChainBuilder, ChainInput, ChainOutput, RagChain};
pub use ingest::Ingestor;
pub use splitter::TextSplitter;
pub use sqlite::SqliteVectorStore;
pub use store::{as_retriever, Passage, Retriever, VectorStore, VectorStoreRetriever};
