//! Error types for the TimeWeave coordination layer.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the coordination layer's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for coordinated operations.
///
/// The first four variants form the operation failure taxonomy:
/// [`Error::Network`], [`Error::Timeout`], [`Error::Aborted`] and
/// [`Error::Operation`]. Aborts are never surfaced to users or the error
/// registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connectivity absent or lost mid-operation
    #[error("Network error: {0}")]
    Network(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// Operation superseded or explicitly cancelled
    #[error("Operation aborted")]
    Aborted,

    /// Any other failure raised by the wrapped unit of work
    #[error("{0}")]
    Operation(String),

    /// Error returned by the backend-as-a-service, passed through unchanged
    #[error("Backend error: {0}")]
    Backend(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::Operation`] from anything printable.
    pub fn operation(msg: impl Into<String>) -> Self {
        Error::Operation(msg.into())
    }

    /// The error used when an operation is attempted while offline.
    pub fn no_connection() -> Self {
        Error::Network("No internet connection".to_string())
    }

    /// True for intentional cancellation or supersession.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// Taxonomy name used in structured logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Network(_) => "network",
            Error::Timeout(_) => "timeout",
            Error::Aborted => "abort",
            Error::Operation(_) | Error::Backend(_) => "operation",
            Error::NotFound(_) => "not_found",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::InvalidInput(_) => "invalid_input",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
