use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::schemas::{DeleteFileRequest, DocumentInfo, UploadDocumentRequest};
use crate::state::AppState;

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let filename = payload.filename.trim();
    if filename.is_empty() {
        return Err(ApiError::BadRequest("filename must not be empty".to_string()));
    }
    if payload.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let file_id = state.ingestor.ingest(filename, &payload.content).await?;

    Ok(Json(json!({
        "message": format!("File {} has been successfully uploaded and indexed.", filename),
        "file_id": file_id
    })))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DocumentInfo>>, ApiError> {
    Ok(Json(state.documents.list_documents().await?))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeleteFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let not_found = || {
        ApiError::NotFound(format!(
            "Document with file_id {} not found",
            payload.file_id
        ))
    };

    let Some(document) = state.documents.get_document(payload.file_id).await? else {
        return Err(not_found());
    };
    if !state.ingestor.delete(document.id).await? {
        return Err(not_found());
    }
    tracing::info!(file_id = document.id, filename = %document.filename, "Document deleted");

    Ok(Json(json!({
        "message": format!(
            "Successfully deleted document with file_id {} from the system.",
            payload.file_id
        )
    })))
}
