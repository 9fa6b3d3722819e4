//! HTTP surface for chat sessions.
//!
//! A browser or script creates a session, uploads documents to it, then asks
//! questions against the processed documents. Every session is independent.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/sessions` | Create a session |
//! | `GET`  | `/sessions/{id}` | Session status and rendered messages |
//! | `POST` | `/sessions/{id}/process` | Multipart upload: `files` parts plus optional `api_key` |
//! | `POST` | `/sessions/{id}/chat` | Ask a question: `{"question": "..."}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "no documents have been processed for this session yet" } }
//! ```
//!
//! Error codes: `missing_credential` (400), `empty_question` (400),
//! `bad_request` (400), `not_found` (404), `not_ready` (409),
//! `extraction_failed` (422), `embedding_failed` (502), `remote_error` (502),
//! `internal` (500).

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::DocChatError;
use crate::models::{ChatMessage, UploadedFile};
use crate::session::{Pipeline, ProcessReport, Session, SessionStatus, SessionStore};

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    sessions: SessionStore,
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pipeline = Pipeline::from_config(config.clone())?;
    let app = router(pipeline);

    tracing::info!(bind = %bind_addr, "docchat server listening");
    println!("docchat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router over `pipeline`.
pub fn router(pipeline: Pipeline) -> Router {
    let server = &pipeline.config.server;
    let body_limit = server.max_upload_bytes;
    let sessions = SessionStore::from_config(server);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", get(handle_get_session))
        .route("/sessions/{id}/process", post(handle_process))
        .route("/sessions/{id}/chat", post(handle_chat))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { pipeline, sessions })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<DocChatError> for AppError {
    fn from(err: DocChatError) -> Self {
        let status = match &err {
            DocChatError::MissingCredential | DocChatError::EmptyQuestion => StatusCode::BAD_REQUEST,
            DocChatError::NotReady => StatusCode::CONFLICT,
            DocChatError::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DocChatError::Embedding(_) | DocChatError::Remote { .. } | DocChatError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            DocChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

fn lookup(state: &AppState, id: &str) -> Result<Arc<tokio::sync::Mutex<Session>>, AppError> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /sessions ============

#[derive(Serialize)]
struct CreatedSession {
    id: String,
}

async fn handle_create_session(State(state): State<AppState>) -> (StatusCode, Json<CreatedSession>) {
    let id = state.sessions.create();
    tracing::debug!(session = %id, "session created");
    (StatusCode::CREATED, Json(CreatedSession { id }))
}

// ============ GET /sessions/{id} ============

/// One history entry as shown to the user.
#[derive(Serialize)]
struct RenderedMessage {
    index: usize,
    role: crate::models::Role,
    is_user: bool,
    content: String,
}

fn render(history: &[ChatMessage]) -> Vec<RenderedMessage> {
    history
        .iter()
        .enumerate()
        .map(|(index, m)| RenderedMessage {
            index,
            role: m.role,
            is_user: m.is_user(),
            content: m.content.clone(),
        })
        .collect()
}

#[derive(Serialize)]
struct SessionView {
    #[serde(flatten)]
    status: SessionStatus,
    history: Vec<RenderedMessage>,
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let handle = lookup(&state, &id)?;
    let session = handle.lock().await;
    Ok(Json(SessionView {
        status: session.status(),
        history: render(session.history()),
    }))
}

// ============ POST /sessions/{id}/process ============

async fn handle_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ProcessReport>, AppError> {
    let handle = lookup(&state, &id)?;

    let mut files = Vec::new();
    let mut api_key: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("files") => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| bad_request("every files part needs a filename"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read {}: {}", name, e)))?;
                files.push(UploadedFile::new(name, bytes.to_vec()));
            }
            Some("api_key") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("failed to read api_key: {}", e)))?;
                api_key = Some(text);
            }
            other => {
                return Err(bad_request(format!(
                    "unexpected multipart field: {}",
                    other.unwrap_or("<unnamed>")
                )));
            }
        }
    }

    // Detached so a dropped connection cannot strand the session mid-process.
    let pipeline = state.pipeline.clone();
    let report = tokio::spawn(async move {
        let mut session = handle.lock().await;
        session.process(&pipeline, files, api_key.as_deref()).await
    })
    .await
    .map_err(|e| internal(format!("processing task failed: {}", e)))??;

    Ok(Json(report))
}

// ============ POST /sessions/{id}/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    standalone_question: String,
    sources: Vec<crate::index::ScoredChunk>,
    usage: crate::models::Usage,
    messages: Vec<RenderedMessage>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    let handle = lookup(&state, &id)?;

    let response = tokio::spawn(async move {
        let mut session = handle.lock().await;
        let answer = session.ask(&req.question).await?;
        Ok::<_, DocChatError>(ChatResponse {
            answer: answer.answer,
            standalone_question: answer.standalone_question,
            sources: answer.sources,
            usage: answer.usage,
            messages: render(session.history()),
        })
    })
    .await
    .map_err(|e| internal(format!("chat task failed: {}", e)))??;

    Ok(Json(response))
}
