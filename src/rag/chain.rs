//! History-aware retrieval QA chain.
//!
//! Two LLM stages around one retrieval:
//! 1. rewrite the latest input into a standalone question (skipped when there is no history)
//! 2. answer the original input from the retrieved passages and the history

use std::sync::Arc;

use serde::Serialize;

use super::store::{Passage, Retriever};
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::schemas::{ChatTurn, ModelName};

pub const CONTEXTUALIZE_Q_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, \
formulate a standalone question which can be understood \
without the chat history. Do NOT answer the question, \
just reformulate it if needed and otherwise return it as is.";

pub const QA_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Use the following context to answer the user's question.";

#[derive(Debug, Clone)]
pub struct ChainInput {
    pub input: String,
    pub chat_history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainOutput {
    pub answer: String,
    /// Passages the answer was grounded on.
    pub context: Vec<Passage>,
    /// Query actually sent to the retriever.
    pub standalone_question: String,
}

/// Holds the process-wide retriever and LLM client; hands out per-model chains.
#[derive(Clone)]
pub struct ChainBuilder {
    llm: Arc<dyn LlmProvider>,
    retriever: Arc<dyn Retriever>,
    max_tokens: u32,
}

impl ChainBuilder {
    pub fn new(llm: Arc<dyn LlmProvider>, retriever: Arc<dyn Retriever>, max_tokens: u32) -> Self {
        Self {
            llm,
            retriever,
            max_tokens,
        }
    }

    pub fn build_chain(&self, model: ModelName) -> RagChain {
        RagChain {
            llm: self.llm.clone(),
            retriever: self.retriever.clone(),
            model,
            max_tokens: self.max_tokens,
        }
    }
}

/// Stateless between invocations; everything per-call arrives in [`ChainInput`].
#[derive(Clone)]
pub struct RagChain {
    llm: Arc<dyn LlmProvider>,
    retriever: Arc<dyn Retriever>,
    model: ModelName,
    max_tokens: u32,
}

impl RagChain {
    pub async fn invoke(&self, input: ChainInput) -> Result<ChainOutput, ApiError> {
        let standalone_question = self.standalone_question(&input).await?;
        let context = self.retriever.retrieve(&standalone_question).await?;
        tracing::debug!(
            model = %self.model,
            passages = context.len(),
            "Retrieved context"
        );

        let request = ChatRequest::new(answer_messages(&input, &context))
            .with_max_tokens(self.max_tokens);
        let answer = self.llm.chat(request, self.model).await?;

        Ok(ChainOutput {
            answer,
            context,
            standalone_question,
        })
    }

    async fn standalone_question(&self, input: &ChainInput) -> Result<String, ApiError> {
        if input.chat_history.is_empty() {
            return Ok(input.input.clone());
        }

        let request = ChatRequest::new(contextualize_messages(input))
            .with_max_tokens(self.max_tokens);
        let rewritten = self.llm.chat(request, self.model).await?;
        let rewritten = rewritten.trim();

        if rewritten.is_empty() {
            return Ok(input.input.clone());
        }
        Ok(rewritten.to_string())
    }
}

fn contextualize_messages(input: &ChainInput) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(input.chat_history.len() + 2);
    messages.push(ChatMessage::system(CONTEXTUALIZE_Q_SYSTEM_PROMPT));
    messages.extend(input.chat_history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(input.input.clone()));
    messages
}

fn answer_messages(input: &ChainInput, context: &[Passage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(input.chat_history.len() + 3);
    messages.push(ChatMessage::system(QA_SYSTEM_PROMPT));
    messages.push(ChatMessage::system(format!(
        "Context: {}",
        format_context(context)
    )));
    messages.extend(input.chat_history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(input.input.clone()));
    messages
}

fn format_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
