//! Session controller: an explicit state machine over the pipeline.
//!
//! ```text
//!                 process() ok
//!  Uninitialized ──────────────▶ Ready ◀──┐
//!        │                         │      │ process() ok (fresh index + history)
//!        └──── Processing ◀────────┴──────┘
//!              (transient; restored to the previous state on failure)
//! ```
//!
//! A session owns at most one [`ConversationEngine`]. Questions are only
//! accepted in `Ready`. A Process action either completes fully or leaves
//! the session exactly as it was.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::chat::{ChatModel, OpenAIChat};
use crate::chunk::chunk_text;
use crate::config::{Config, ServerConfig};
use crate::conversation::{Answer, ConversationEngine, EngineSettings};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{DocChatError, Result};
use crate::index::VectorIndex;
use crate::ingest::ingest_files;
use crate::models::{ChatMessage, UploadedFile, Usage};

/// The long-lived collaborators shared by every session.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<Config>,
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
}

impl Pipeline {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> Self {
        Self {
            config: Arc::new(config),
            embedder,
            chat,
        }
    }

    /// Build the embedder and chat client named by the configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config)?;
        let chat: Arc<dyn ChatModel> = Arc::new(OpenAIChat::new(&config.chat)?);
        Ok(Self::new(config, embedder, chat))
    }

    fn resolve_credential(&self, supplied: Option<&str>) -> Result<String> {
        supplied
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.config.chat.default_credential())
            .ok_or(DocChatError::MissingCredential)
    }
}

pub enum SessionState {
    Uninitialized,
    Processing,
    Ready(ConversationEngine),
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Processing => "processing",
            SessionState::Ready(_) => "ready",
        }
    }
}

/// Outcome of a successful Process action.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub files: usize,
    pub characters: usize,
    pub chunks: usize,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: String,
    pub state: &'static str,
    pub created_at: DateTime<Utc>,
    pub messages: usize,
    pub chunks: Option<usize>,
    pub usage: Usage,
}

pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    state: SessionState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_active: now,
            state: SessionState::Uninitialized,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready(_))
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Dialogue history; empty unless the session is ready.
    pub fn history(&self) -> &[ChatMessage] {
        match &self.state {
            SessionState::Ready(engine) => engine.history(),
            _ => &[],
        }
    }

    pub fn status(&self) -> SessionStatus {
        let (chunks, usage) = match &self.state {
            SessionState::Ready(engine) => (Some(engine.chunk_count()), engine.usage()),
            _ => (None, Usage::default()),
        };
        SessionStatus {
            id: self.id.clone(),
            state: self.state.label(),
            created_at: self.created_at,
            messages: self.history().len(),
            chunks,
            usage,
        }
    }

    /// Ingest, chunk, and index `files`, then bind a fresh conversation
    /// engine. Any prior index and history are discarded on success only.
    pub async fn process(
        &mut self,
        pipeline: &Pipeline,
        files: Vec<UploadedFile>,
        credential: Option<&str>,
    ) -> Result<ProcessReport> {
        let credential = pipeline.resolve_credential(credential)?;
        self.last_active = Utc::now();

        let previous = std::mem::replace(&mut self.state, SessionState::Processing);
        match build_engine(pipeline, files, credential).await {
            Ok((engine, report)) => {
                tracing::info!(
                    session = %self.id,
                    files = report.files,
                    characters = report.characters,
                    chunks = report.chunks,
                    "documents processed"
                );
                self.state = SessionState::Ready(engine);
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "processing failed");
                self.state = previous;
                Err(e)
            }
        }
    }

    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let engine = match &mut self.state {
            SessionState::Ready(engine) => engine,
            _ => return Err(DocChatError::NotReady),
        };
        self.last_active = Utc::now();
        engine.ask(question).await
    }
}

async fn build_engine(
    pipeline: &Pipeline,
    files: Vec<UploadedFile>,
    credential: String,
) -> Result<(ConversationEngine, ProcessReport)> {
    let file_count = files.len();
    let chunking = pipeline.config.chunking.clone();

    let (characters, chunks) = tokio::task::spawn_blocking(move || {
        let text = ingest_files(&files)?;
        let chunks = chunk_text(&text, &chunking);
        Ok::<_, DocChatError>((text.chars().count(), chunks))
    })
    .await
    .map_err(|e| DocChatError::Internal(e.to_string()))??;

    let chunk_count = chunks.len();
    let index = VectorIndex::build(
        chunks,
        pipeline.embedder.as_ref(),
        pipeline.config.embedding.batch_size,
    )
    .await
    .map_err(DocChatError::Embedding)?;

    let engine = ConversationEngine::new(
        index,
        Arc::clone(&pipeline.embedder),
        Arc::clone(&pipeline.chat),
        credential,
        EngineSettings::from_config(&pipeline.config),
    );

    Ok((
        engine,
        ProcessReport {
            files: file_count,
            characters,
            chunks: chunk_count,
        },
    ))
}

/// Sessions keyed by id. Each session sits behind its own async mutex, so
/// interactions on one session run one at a time.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<tokio::sync::Mutex<Session>>>>>,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: Arc::default(),
            ttl,
        }
    }

    /// A store expiring sessions after `[server].session_ttl_secs`.
    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(server.session_ttl())
    }

    pub fn create(&self) -> String {
        self.sweep_idle();
        let session = Session::new();
        let id = session.id().to_string();
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), Arc::new(tokio::sync::Mutex::new(session)));
        id
    }

    /// Look up a session. Expired sessions are swept first, so an idle id
    /// is reported as missing.
    pub fn get(&self, id: &str) -> Option<Arc<tokio::sync::Mutex<Session>>> {
        self.sweep_idle();
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions idle for longer than the TTL. Busy sessions are kept.
    fn sweep_idle(&self) {
        let Some(ttl) = self.ttl.and_then(|t| chrono::Duration::from_std(t).ok()) else {
            return;
        };
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(s) => s.last_active() >= cutoff,
            Err(_) => true,
        });
        let dropped = before - sessions.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired idle sessions");
        }
    }
}
