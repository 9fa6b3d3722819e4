//! Error taxonomy surfaced to users of a chat session.
//!
//! Three families matter to callers:
//!
//! | Family | Variants | Effect |
//! |--------|----------|--------|
//! | User-recoverable | [`MissingCredential`](DocChatError::MissingCredential), [`NotReady`](DocChatError::NotReady), [`EmptyQuestion`](DocChatError::EmptyQuestion) | Nothing runs; the session is unchanged. |
//! | Processing | [`Extraction`](DocChatError::Extraction), [`Embedding`](DocChatError::Embedding) | The whole Process action aborts; the previous session state is kept. |
//! | Remote | [`Remote`](DocChatError::Remote), [`Http`](DocChatError::Http) | The chat turn aborts; history is left as it was. |

use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum DocChatError {
    #[error("no credential for the chat service was supplied")]
    MissingCredential,

    #[error("no documents have been processed for this session yet")]
    NotReady,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("failed to extract text from {file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractError,
    },

    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("chat service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DocChatError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DocChatError::MissingCredential => "missing_credential",
            DocChatError::NotReady => "not_ready",
            DocChatError::EmptyQuestion => "empty_question",
            DocChatError::Extraction { .. } => "extraction_failed",
            DocChatError::Embedding(_) => "embedding_failed",
            DocChatError::Remote { .. } | DocChatError::Http(_) => "remote_error",
            DocChatError::Internal(_) => "internal",
        }
    }
}

pub type Result<T, E = DocChatError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_share_a_code() {
        let err = DocChatError::Remote {
            status: 401,
            message: "invalid api key".to_string(),
        };
        assert_eq!(err.code(), "remote_error");
        assert_eq!(err.to_string(), "chat service returned 401: invalid api key");
    }

    #[test]
    fn extraction_error_names_the_file() {
        let err = DocChatError::Extraction {
            file: "report.pdf".to_string(),
            source: ExtractError::Pdf("bad xref".to_string()),
        };
        assert!(err.to_string().contains("report.pdf"));
        assert_eq!(err.code(), "extraction_failed");
    }
}
