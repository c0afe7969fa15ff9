use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::config::ApiKey;
use crate::core::errors::ApiError;
use crate::schemas::ModelName;

/// Client for any `/chat/completions` + `/embeddings` endpoint speaking the
/// OpenAI wire format (OpenRouter by default).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: ApiKey,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: ApiKey) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("ragchat-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn chat(&self, request: ChatRequest, model: ModelName) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": model.as_str(),
            "messages": request.messages,
            "stream": false,
        });
        if let (Some(obj), Some(max_tokens)) = (body.as_object_mut(), request.max_tokens) {
            obj.insert("max_tokens".to_string(), json!(max_tokens));
        }

        let res = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: ChatCompletionResponse = res.json().await.map_err(ApiError::upstream)?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Upstream("chat completion returned no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        tracing::debug!(model = %model, chars = content.len(), "Chat completion received");
        Ok(content)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "embedding request failed ({}): {}",
                status, text
            )));
        }

        let mut payload: EmbeddingsResponse = res.json().await.map_err(ApiError::upstream)?;
        if payload.data.len() != inputs.len() {
            return Err(ApiError::Upstream(format!(
                "embedding response has {} vectors for {} inputs",
                payload.data.len(),
                inputs.len()
            )));
        }
        payload.data.sort_by_key(|item| item.index);

        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}
