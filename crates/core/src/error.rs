//! Error types for Testbed.

use thiserror::Error;

/// Result type alias using Testbed's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Testbed.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Capability / Precondition Errors
    // =========================================================================
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Engine error: {0}")]
    Engine(String),

    // =========================================================================
    // Wait / Stream Errors
    // =========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Stream ended: {0}")]
    StreamEnded(String),

    #[error("Frame consumer failed: {0}")]
    Consumer(String),

    // =========================================================================
    // Input Errors
    // =========================================================================
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a capability error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an engine (transport) error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a frame consumer error.
    pub fn consumer(msg: impl Into<String>) -> Self {
        Self::Consumer(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifiers() {
        assert!(Error::not_found("image foo").is_not_found());
        assert!(Error::unsupported("exec").is_unsupported());
        assert!(Error::timeout("wait").is_timeout());
        assert!(!Error::engine("boom").is_not_found());
    }

    #[test]
    fn test_display() {
        let err = Error::precondition("container is not running");
        assert_eq!(
            err.to_string(),
            "Precondition failed: container is not running"
        );
    }
}
