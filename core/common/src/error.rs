//! Common error types for Casefile.

use thiserror::Error;

/// Top-level error type for Casefile operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A record is missing fields required to build a client or session.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credentials were rejected by the cloud provider.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A record failed a write-time validation rule.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Model invocation failed.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Persistence layer failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A capability was not compiled in or is not configured.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Conflicting concurrent write.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    /// Whether the error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
