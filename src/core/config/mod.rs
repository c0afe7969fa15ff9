pub mod paths;
pub mod service;
pub mod settings;
pub mod validation;

pub use paths::AppPaths;
pub use service::{ApiKey, ConfigService};
pub use settings::{AppConfig, DatabaseConfig, EmbeddingConfig, LlmConfig, RetrievalConfig, ServerConfig};
