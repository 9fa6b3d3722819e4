//! TOML configuration.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below, so `docchat` runs without any config file at all.
//!
//! ```toml
//! [chunking]
//! chunk_size = 900
//! chunk_overlap = 100
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [retrieval]
//! top_k = 4
//!
//! [chat]
//! model = "gpt-3.5-turbo-16k"
//! temperature = 0.0
//!
//! [server]
//! bind = "127.0.0.1:8501"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable holding the default chat credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

fn default_separator() -> String {
    "\n".to_string()
}
fn default_chunk_size() -> usize {
    900
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `openai` and `ollama` providers.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    /// Default credential. Falls back to `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// No timeout unless set; a hung call stalls that turn.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Rephrase follow-up questions into standalone ones before retrieval.
    #[serde(default = "default_condense_question")]
    pub condense_question: bool,
    /// How many past exchanges to resubmit per turn. Unbounded when unset.
    #[serde(default)]
    pub history_window: Option<usize>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            temperature: 0.0,
            base_url: default_chat_base_url(),
            api_key: None,
            timeout_secs: None,
            condense_question: default_condense_question(),
            history_window: None,
        }
    }
}

impl ChatConfig {
    /// The configured credential, then `OPENAI_API_KEY`. Blank values count as missing.
    pub fn default_credential(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo-16k".to_string()
}
fn default_chat_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_condense_question() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Sessions idle for longer than this are dropped. `0` keeps them until exit.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024
}
fn default_session_ttl_secs() -> u64 {
    3600
}

impl ServerConfig {
    /// The idle timeout for sessions, or `None` when expiry is turned off.
    pub fn session_ttl(&self) -> Option<std::time::Duration> {
        (self.session_ttl_secs > 0).then(|| std::time::Duration::from_secs(self.session_ttl_secs))
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }

        if !(0.0..=2.0).contains(&self.chat.temperature) {
            anyhow::bail!("chat.temperature must be in [0.0, 2.0]");
        }

        if self.chat.history_window == Some(0) {
            anyhow::bail!("chat.history_window must be >= 1 when set");
        }

        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "local" | "hash" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    anyhow::bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hash.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
