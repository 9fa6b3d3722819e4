//! # docchat
//!
//! Conversational question answering over a handful of uploaded documents.
//!
//! Files are extracted to text, split into overlapping chunks, embedded into
//! an in-memory index, and then queried by a retrieval-augmented chat loop
//! that remembers the conversation so far.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │ PDF/DOCX/CSV │──▶│  ingest  │──▶│ chunk+embed │──▶│ VectorIndex  │
//! └──────────────┘   └──────────┘   └─────────────┘   └──────┬───────┘
//!                                                            │
//!                                     ┌──────────────────────┤
//!                                     ▼                      ▼
//!                              ┌─────────────┐        ┌─────────────┐
//!                              │ Conversation│◀──────▶│  chat API   │
//!                              │   Engine    │        │ (OpenAI)    │
//!                              └──────┬──────┘        └─────────────┘
//!                                     │ owned by
//!                              ┌──────┴──────┐
//!                              │   Session   │◀── CLI REPL / HTTP
//!                              └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Session-level error taxonomy |
//! | [`extract`] | Per-format text extraction |
//! | [`ingest`] | Concatenate extracted text across files |
//! | [`chunk`] | Separator-based chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`chat`] | Remote chat-completion client |
//! | [`conversation`] | Conversational retrieval engine |
//! | [`session`] | Session state machine and store |
//! | [`server`] | HTTP API |
//! | [`chat_cmd`] | Terminal chat loop |

pub mod chat;
pub mod chat_cmd;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod models;
pub mod server;
pub mod session;
