use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::llm::{LlmProvider, OpenAiCompatProvider};
use crate::rag::{as_retriever, ChainBuilder, Ingestor, SqliteVectorStore, TextSplitter, VectorStore};
use crate::schemas::{SessionIdGenerator, UuidSessionIds};
use crate::store::{ChatLogStore, Database, DocumentStore};

pub mod error;

use error::InitializationError;

/// Shared application state handed to every route.
///
/// Every dependency is built once in [`AppState::initialize`] and released
/// in [`AppState::shutdown`].
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub database: Database,
    pub chat_logs: ChatLogStore,
    pub documents: DocumentStore,
    pub vector_store: Arc<dyn VectorStore>,
    pub chains: ChainBuilder,
    pub ingestor: Ingestor,
    pub session_ids: Arc<dyn SessionIdGenerator>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// 1. Load and validate configuration, resolve the API key
    /// 2. Open the relational database and the vector store
    /// 3. Bind the retriever and build the chain factory
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config_service = ConfigService::new(paths.clone());
        let config = config_service
            .load_config()
            .map_err(InitializationError::Config)?;
        if let Ok(raw) = config_service.load_raw() {
            tracing::info!(
                path = %config_service.config_path().display(),
                config = %config_service.redact_sensitive_values(&raw),
                "Configuration loaded"
            );
        }

        let api_key = config_service
            .resolve_api_key(&config.llm)
            .map_err(InitializationError::Config)?;

        let db_path = config
            .database
            .path
            .clone()
            .unwrap_or_else(|| paths.db_path.clone());
        let database = Database::connect(&db_path, config.database.max_connections)
            .await
            .map_err(|e| InitializationError::Database(e.into()))?;

        let llm: Arc<dyn LlmProvider> = Arc::new(
            OpenAiCompatProvider::new(config.llm.base_url.clone(), api_key.clone())
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );
        let embedder: Arc<dyn LlmProvider> = Arc::new(
            OpenAiCompatProvider::new(config.embedding_base_url(), api_key)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );

        let vector_path = config
            .database
            .vector_path
            .clone()
            .unwrap_or_else(|| paths.vector_db_path.clone());
        let vector_store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::open(&vector_path, embedder, config.embedding.model.clone())
                .await
                .map_err(|e| InitializationError::VectorStore(e.into()))?,
        );

        tracing::info!(
            provider = llm.name(),
            base_url = %config.llm.base_url,
            embedding_model = %config.embedding.model,
            top_k = config.retrieval.top_k,
            "LLM chain configured"
        );

        Ok(Arc::new(Self::from_parts(
            paths,
            config,
            database,
            llm,
            vector_store,
            Arc::new(UuidSessionIds),
        )))
    }

    /// Wires already-constructed dependencies together.
    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: AppConfig,
        database: Database,
        llm: Arc<dyn LlmProvider>,
        vector_store: Arc<dyn VectorStore>,
        session_ids: Arc<dyn SessionIdGenerator>,
    ) -> Self {
        let retriever = Arc::new(as_retriever(vector_store.clone(), config.retrieval.top_k));
        let chains = ChainBuilder::new(llm, retriever, config.llm.max_tokens);
        let documents = database.documents();
        let ingestor = Ingestor::new(
            documents.clone(),
            vector_store.clone(),
            TextSplitter::from_config(&config.retrieval),
        );

        Self {
            paths,
            config: Arc::new(config),
            chat_logs: database.chat_logs(),
            documents,
            database,
            vector_store,
            chains,
            ingestor,
            session_ids,
        }
    }

    /// Closes the database and vector-store pools.
    pub async fn shutdown(&self) {
        self.vector_store.close().await;
        self.database.close().await;
    }
}
