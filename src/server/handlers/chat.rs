use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::core::errors::ApiError;
use crate::rag::ChainInput;
use crate::schemas::{QueryInput, QueryRequest, QueryResponse};
use crate::state::AppState;

/// One conversational turn: load history, answer, log the exchange.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let query = QueryInput::resolve(request, state.session_ids.as_ref());
    tracing::info!(
        session_id = %query.session_id,
        model = %query.model,
        question_chars = query.question.chars().count(),
        "Chat query received"
    );
    tracing::debug!(session_id = %query.session_id, question = %query.question, "Chat question");

    let chat_history = state.chat_logs.fetch_history(&query.session_id).await?;
    let output = state
        .chains
        .build_chain(query.model)
        .invoke(ChainInput {
            input: query.question.clone(),
            chat_history,
        })
        .await?;

    state
        .chat_logs
        .record_chat(
            &query.session_id,
            &query.question,
            &output.answer,
            query.model.as_str(),
        )
        .await?;
    tracing::info!(
        session_id = %query.session_id,
        model = %query.model,
        answer_chars = output.answer.chars().count(),
        passages = output.context.len(),
        "Chat answer recorded"
    );
    tracing::debug!(session_id = %query.session_id, answer = %output.answer, "Chat answer");

    Ok(Json(QueryResponse {
        answer: output.answer,
        session_id: query.session_id,
        model: query.model,
    }))
}
