use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::ApiError;
use crate::schemas::ModelName;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openrouter")
    fn name(&self) -> &str;

    /// chat completion (non-streaming); errors are passed through without retry
    async fn chat(&self, request: ChatRequest, model: ModelName) -> Result<String, ApiError>;

    /// embeddings for each input, in input order
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError>;
}
