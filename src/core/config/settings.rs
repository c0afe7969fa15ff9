//! Typed view of the merged `config.yml` + `secrets.yaml` document.
//!
//! Every section is optional in the file; missing keys fall back to the
//! defaults below.

use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Overrides the data-directory default (`rag.db`).
    pub path: Option<PathBuf>,
    pub vector_path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            vector_path: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key_env: String,
    /// Fallback when the environment variable is unset; normally lives in `secrets.yaml`.
    pub api_key: Option<String>,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            max_tokens: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Defaults to `llm.base_url`.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 2,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl AppConfig {
    pub fn embedding_base_url(&self) -> &str {
        self.embedding
            .base_url
            .as_deref()
            .unwrap_or(&self.llm.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({})).unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.llm.max_tokens, 200);
        assert_eq!(config.retrieval.top_k, 2);
        assert_eq!(config.embedding_base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "llm": { "max_tokens": 512 },
            "embedding": { "base_url": "http://localhost:1234/v1" }
        }))
        .unwrap();

        assert_eq!(config.llm.max_tokens, 512);
        assert_eq!(config.llm.api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(config.embedding_base_url(), "http://localhost:1234/v1");
    }
}
