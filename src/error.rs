//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend could not be reached or failed an I/O operation
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Value could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Key is empty or too long
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// TTL is zero or negative
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// A call argument has no canonical form
    #[error("Unhashable argument: {0}")]
    UnhashableArgument(String),

    /// Backend call did not finish in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Returns true for failures that say nothing about the stored data,
    /// only that the backend could not be used.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CacheError::BackendUnavailable(_) | CacheError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::BackendUnavailable(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::BackendUnavailable(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_unavailable() {
        let err: CacheError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, CacheError::BackendUnavailable(_)));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_validation_errors_are_not_unavailable() {
        assert!(!CacheError::InvalidKey("empty".into()).is_unavailable());
        assert!(!CacheError::InvalidTtl("-1".into()).is_unavailable());
        assert!(CacheError::Timeout(Duration::from_millis(5)).is_unavailable());
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::InvalidTtl("TTL must be positive".into());
        assert_eq!(err.to_string(), "Invalid TTL: TTL must be positive");
    }
}
