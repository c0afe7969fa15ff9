use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, documents, health};
use crate::state::AppState;

/// Creates the application router with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);
    Router::new()
        .route("/health", get(health::health))
        .route("/chat", post(chat::chat))
        .route("/upload-doc", post(documents::upload_document))
        .route("/list-docs", get(documents::list_documents))
        .route("/delete-doc", post(documents::delete_document))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let allowed_origins = resolve_allowed_origins(&state.config.server.cors_allowed_origins)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins = configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins();
    }

    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:8501".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:8501".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::core::config::{AppConfig, AppPaths};
    use crate::core::errors::ApiError;
    use crate::llm::{ChatRequest, LlmProvider};
    use crate::rag::{Passage, VectorStore};
    use crate::schemas::{ModelName, SessionIdGenerator};
    use crate::store::Database;

    /// Answers with the last user message; counts calls.
    #[derive(Default)]
    struct EchoLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(&self, request: ChatRequest, model: ModelName) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(format!("{}: {}", model, last))
        }

        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0]).collect())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        passages: Mutex<Vec<Passage>>,
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn add_passages(&self, passages: Vec<Passage>) -> Result<usize, ApiError> {
            let count = passages.len();
            self.passages.lock().unwrap().extend(passages);
            Ok(count)
        }

        async fn similarity_search(&self, _query: &str, k: usize) -> Result<Vec<Passage>, ApiError> {
            Ok(self.passages.lock().unwrap().iter().take(k).cloned().collect())
        }

        async fn delete_document(&self, file_id: i64) -> Result<usize, ApiError> {
            let mut passages = self.passages.lock().unwrap();
            let before = passages.len();
            passages.retain(|p| p.file_id != file_id);
            Ok(before - passages.len())
        }
    }

    struct SequentialIds(AtomicUsize);

    impl SessionIdGenerator for SequentialIds {
        fn generate(&self) -> String {
            format!("session-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    struct Harness {
        _tmp: tempfile::TempDir,
        app: Router,
        state: Arc<AppState>,
        llm: Arc<EchoLlm>,
        store: Arc<MemoryStore>,
    }

    async fn harness() -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::with_data_dir(
            tmp.path().to_path_buf(),
            tmp.path().join("data"),
        ));
        let database = Database::connect(&paths.db_path, 4).await.unwrap();
        let llm = Arc::new(EchoLlm::default());
        let store = Arc::new(MemoryStore::default());

        let state = Arc::new(AppState::from_parts(
            paths,
            AppConfig::default(),
            database,
            llm.clone(),
            store.clone(),
            Arc::new(SequentialIds(AtomicUsize::new(0))),
        ));

        Harness {
            _tmp: tmp,
            app: router(state.clone()),
            state,
            llm,
            store,
        }
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let h = harness().await;

        let (status, body) = send(&h.app, Method::GET, "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn chat_assigns_session_and_records_turns() {
        let h = harness().await;

        let (status, body) = send(
            &h.app,
            Method::POST,
            "/chat",
            Some(json!({ "question": "What is LangChain?" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "session-1");
        assert_eq!(body["model"], "deepseek/deepseek-prover-v2");
        assert_eq!(body["answer"], "deepseek/deepseek-prover-v2: What is LangChain?");
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 1);

        let history = h.state.chat_logs.fetch_history("session-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "What is LangChain?");
    }

    #[tokio::test]
    async fn follow_up_in_same_session_reformulates_first() {
        let h = harness().await;

        send(
            &h.app,
            Method::POST,
            "/chat",
            Some(json!({ "question": "What is LangChain?", "session_id": "s1", "model": "deepseek-chat" })),
        )
        .await;
        let (status, body) = send(
            &h.app,
            Method::POST,
            "/chat",
            Some(json!({ "question": "Can it be used with RAG?", "session_id": "s1", "model": "deepseek-chat" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "s1");
        // one call for the first turn, rewrite + answer for the second
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.state.chat_logs.fetch_history("s1").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_the_chain_runs() {
        let h = harness().await;

        let (status, _) = send(
            &h.app,
            Method::POST,
            "/chat",
            Some(json!({ "question": "hi", "model": "gpt-4" })),
        )
        .await;

        assert!(status.is_client_error());
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn document_upload_list_and_delete() {
        let h = harness().await;

        let (status, body) = send(
            &h.app,
            Method::POST,
            "/upload-doc",
            Some(json!({ "filename": "a.pdf", "content": "alpha document" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let first = body["file_id"].as_i64().unwrap();

        let (_, body) = send(
            &h.app,
            Method::POST,
            "/upload-doc",
            Some(json!({ "filename": "b.pdf", "content": "beta document" })),
        )
        .await;
        let second = body["file_id"].as_i64().unwrap();
        assert!(second > first);

        let (status, body) = send(&h.app, Method::GET, "/list-docs", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|doc| doc["filename"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);

        let (status, _) = send(&h.app, Method::POST, "/delete-doc", Some(json!({ "file_id": first }))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.store.passages.lock().unwrap().iter().all(|p| p.file_id == second));

        let (status, body) = send(&h.app, Method::POST, "/delete-doc", Some(json!({ "file_id": first }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains(&first.to_string()));
    }

    #[tokio::test]
    async fn upload_with_empty_fields_is_bad_request() {
        let h = harness().await;

        let (status, _) = send(
            &h.app,
            Method::POST,
            "/upload-doc",
            Some(json!({ "filename": "  ", "content": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &h.app,
            Method::POST,
            "/upload-doc",
            Some(json!({ "filename": "a.txt", "content": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.state.documents.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn database_failure_surfaces_as_internal_error() {
        let h = harness().await;
        h.state.database.close().await;

        let (status, body) = send(
            &h.app,
            Method::POST,
            "/chat",
            Some(json!({ "question": "What is X?", "session_id": "s1" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);

        let (status, body) = send(
            &h.app,
            Method::POST,
            "/upload-doc",
            Some(json!({ "filename": "a.pdf", "content": "alpha document" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
        assert!(h.store.passages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_document_leaves_index_alone() {
        let h = harness().await;

        let (_, body) = send(
            &h.app,
            Method::POST,
            "/upload-doc",
            Some(json!({ "filename": "a.pdf", "content": "alpha document" })),
        )
        .await;
        let file_id = body["file_id"].as_i64().unwrap();
        // passages without a registry record, e.g. left by an interrupted upload
        h.store
            .add_passages(vec![Passage {
                file_id: file_id + 1,
                filename: "orphan.pdf".to_string(),
                chunk_index: 0,
                content: "orphan".to_string(),
            }])
            .await
            .unwrap();

        let (status, _) = send(
            &h.app,
            Method::POST,
            "/delete-doc",
            Some(json!({ "file_id": file_id + 1 })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(h.store.passages.lock().unwrap().len(), 2);
    }

    #[test]
    fn configured_origins_replace_defaults() {
        assert_eq!(
            resolve_allowed_origins(&[" https://app.example ".to_string(), "".to_string()]),
            vec!["https://app.example".to_string()]
        );
        assert_eq!(resolve_allowed_origins(&[]), default_local_origins());
    }
}
