//! Error types for the staffing query service.

use thiserror::Error;

/// Crate-wide error type.
///
/// Startup failures (`DataLoad`, `Index`, `Config`) abort initialization.
/// Per-request failures (`Validation`, `Embedding`, `Timeout`) are translated
/// into client responses at the HTTP boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Roster source missing, unreadable, or structurally invalid
    #[error("Failed to load roster: {0}")]
    DataLoad(String),

    /// Embedding backend rejected the input or is unavailable
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Caller supplied invalid parameters
    #[error("Validation error: {0}")]
    Validation(String),

    /// Vector index could not be built
    #[error("Index error: {0}")]
    Index(String),

    /// An operation exceeded its time budget
    #[error("Operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP API error
    #[error("API error: {0}")]
    Api(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for service operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_client_error() {
        assert!(Error::Validation("empty query".into()).is_client_error());
        assert!(!Error::Embedding("model gone".into()).is_client_error());
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = Error::Timeout {
            operation: "embed_query".into(),
            duration_ms: 250,
        };
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "Operation 'embed_query' timed out after 250ms"
        );
    }

    #[test]
    fn test_json_error_converts_to_serialization() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
