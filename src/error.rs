//! Error types for cache and session operations
//!
//! The store adapter reports failures through [`CacheError`]. The higher
//! level components (namespaced cache, conversation store) catch these at
//! their own boundary and degrade to a safe default, so most callers only
//! ever see them in logs.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Connection error - store unreachable or connection dropped
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Failure reported by an embedding provider
    #[error("Compute error: {0}")]
    ComputeError(String),

    /// Redis driver error (wrapper)
    #[error("Redis driver error: {0}")]
    DriverError(#[from] redis::RedisError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether this error means the store could not be reached in time.
    pub fn is_connectivity(&self) -> bool {
        match self {
            CacheError::ConnectionError(_) | CacheError::TimeoutError { .. } => true,
            CacheError::DriverError(e) => e.is_io_error() || e.is_connection_dropped(),
            _ => false,
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::ConnectionError("Failed to connect".to_string());
        assert_eq!(error.to_string(), "Connection error: Failed to connect");

        let timeout_error = CacheError::TimeoutError {
            timeout_ms: 3000,
            context: "GET conversation:u1:c1".to_string(),
        };
        assert!(timeout_error.to_string().contains("timed out after 3000ms"));
        assert!(timeout_error.to_string().contains("conversation:u1:c1"));
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "test error".into();
        assert!(matches!(error, CacheError::Other(_)));

        let error: CacheError = "test error".to_string().into();
        assert!(matches!(error, CacheError::Other(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: CacheError = json_err.into();
        assert!(matches!(error, CacheError::SerializationError(_)));
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(CacheError::ConnectionError("down".into()).is_connectivity());
        assert!(CacheError::TimeoutError {
            timeout_ms: 10,
            context: "PING".into()
        }
        .is_connectivity());
        assert!(!CacheError::SerializationError("bad".into()).is_connectivity());
        assert!(!CacheError::ComputeError("model".into()).is_connectivity());
    }
}
