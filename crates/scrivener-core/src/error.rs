use thiserror::Error;

/// Error taxonomy shared by every scrivener crate.
///
/// Variants carry owned strings so a single outcome can be cloned to every
/// caller waiting on the same vectorization job.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Embedding, LLM or vector-index timeout / rate limit. Retryable.
    #[error("Transient upstream failure ({service}): {message}")]
    TransientUpstream { service: String, message: String },

    /// Caller bug: malformed label, empty query, missing scope. Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Some chunks of a document failed to embed.
    #[error("Document {document_id} partially indexed: {failed} chunk(s) failed")]
    PartialIndex { document_id: String, failed: usize },

    /// Model not trained, index not initialized, impossible settings.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn transient(service: impl Into<String>, message: impl ToString) -> Self {
        Self::TransientUpstream { service: service.into(), message: message.to_string() }
    }

    pub fn validation(message: impl Into<String>) -> Self { Self::Validation(message.into()) }

    pub fn operation(message: impl ToString) -> Self { Self::Operation(message.to_string()) }

    pub fn is_transient(&self) -> bool { matches!(self, Self::TransientUpstream { .. }) }
}

pub type Result<T> = std::result::Result<T, Error>;
