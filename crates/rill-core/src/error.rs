//! Error types for Rill sources

use thiserror::Error;

/// Errors raised while propagating through a source graph
#[derive(Error, Debug)]
pub enum SourceError {
    // Sink errors
    #[error("Sink rejected value: {0}")]
    SinkRejected(String),

    #[error("Sink failed to close: {0}")]
    SinkCloseFailed(String),

    // Configuration errors
    #[error("Invalid source options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}

impl SourceError {
    /// Shorthand for a sink refusing a value
    pub fn rejected(reason: impl Into<String>) -> Self {
        SourceError::SinkRejected(reason.into())
    }

    /// Shorthand for a sink failing on close
    pub fn close_failed(reason: impl Into<String>) -> Self {
        SourceError::SinkCloseFailed(reason.into())
    }
}

/// Result type for Rill operations
pub type SourceResult<T> = Result<T, SourceError>;
