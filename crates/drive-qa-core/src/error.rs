//! Error taxonomy shared by the index, retriever, and answer engine.
//!
//! Every fallible core operation returns [`Result<T>`]. Collaborator
//! implementations map their transport failures onto the matching variant
//! so the route layer can translate them into status codes without string
//! matching.

use thiserror::Error;

/// Result alias for the core crate.
pub type Result<T> = std::result::Result<T, QaError>;

/// Failure kinds surfaced by Drive QA operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum QaError {
    /// Listing or writing through the document source failed.
    #[error("document source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single document could not be fetched.
    #[error("document {id} unavailable: {reason}")]
    DocumentUnavailable { id: String, reason: String },

    /// The embedding provider failed or returned an unusable vector.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// The completion provider failed.
    #[error("completion failed: {0}")]
    CompletionFailed(String),

    /// The prompt is over the hard token cap even without document context.
    #[error(
        "Prompt too long ({tokens} tokens, limit {cap}), please ask a more specific question or reduce document size."
    )]
    ContextTooLarge { tokens: usize, cap: usize },

    /// Another rebuild is already running.
    #[error("index rebuild already in progress")]
    RebuildInProgress,

    /// The request itself is malformed (empty query, missing title).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl QaError {
    /// Short machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            QaError::SourceUnavailable(_) => "source_unavailable",
            QaError::DocumentUnavailable { .. } => "document_unavailable",
            QaError::EmbeddingFailed(_) => "embedding_failed",
            QaError::CompletionFailed(_) => "completion_failed",
            QaError::ContextTooLarge { .. } => "context_too_large",
            QaError::RebuildInProgress => "rebuild_in_progress",
            QaError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn document_unavailable(id: impl Into<String>, reason: impl ToString) -> Self {
        QaError::DocumentUnavailable {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}
