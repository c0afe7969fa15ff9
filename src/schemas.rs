//! Request/response contracts shared by the HTTP layer, the chain and the stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hosted chat models this service accepts. Unknown identifiers fail deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelName {
    #[default]
    #[serde(rename = "deepseek/deepseek-prover-v2")]
    DeepseekProverV2,
    #[serde(rename = "deepseek-chat")]
    DeepseekChat,
}

impl ModelName {
    pub const ALL: [ModelName; 2] = [ModelName::DeepseekProverV2, ModelName::DeepseekChat];

    /// Identifier sent to the completion endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::DeepseekProverV2 => "deepseek/deepseek-prover-v2",
            ModelName::DeepseekChat => "deepseek-chat",
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ModelName::ALL
            .into_iter()
            .find(|model| model.as_str() == value)
            .ok_or_else(|| format!("unsupported model: {}", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

/// One prior turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }
}

pub trait SessionIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSessionIds;

impl SessionIdGenerator for UuidSessionIds {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Wire form of a chat query; defaults are filled by [`QueryInput::resolve`].
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: ModelName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInput {
    pub question: String,
    pub session_id: String,
    pub model: ModelName,
}

impl QueryInput {
    pub fn resolve(request: QueryRequest, ids: &dyn SessionIdGenerator) -> Self {
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| ids.generate());

        tracing::info!(session_id = %session_id, "New QueryInput created");

        Self {
            question: request.question,
            session_id,
            model: request.model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub session_id: String,
    pub model: ModelName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: i64,
    pub filename: String,
    pub upload_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub file_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadDocumentRequest {
    pub filename: String,
    pub content: String,
}
