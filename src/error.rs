//! Error types for datachat
//!
//! Centralized error handling using thiserror. Seams with their own failure
//! vocabulary (model client, object store, rate limiter) keep a focused enum
//! and convert into [`DataChatError`] at the crate boundary.

use thiserror::Error;

use crate::llm::LlmError;
use crate::ratelimit::RateLimitExceeded;
use crate::storage::StorageError;

/// All error types that can surface from datachat operations
#[derive(Debug, Error)]
pub enum DataChatError {
    /// Dataset could not be loaded or parsed
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Snippet was rejected before execution
    #[error("Security Violations:\n{}", .0.join("\n"))]
    Rejected(Vec<String>),

    /// Sandbox infrastructure failure (scratch directory, worker join)
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Message cannot be added to the conversation as given
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Model API error
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Object store error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Rate limiter refused the call
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for datachat operations
pub type Result<T> = std::result::Result<T, DataChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_error() {
        let err = DataChatError::Dataset("empty header".to_string());
        assert_eq!(err.to_string(), "Dataset error: empty header");
    }

    #[test]
    fn test_rejected_lists_every_violation() {
        let err = DataChatError::Rejected(vec![
            "Import of 'os' is not allowed".to_string(),
            "Call to 'open' is not allowed".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Security Violations:\nImport of 'os' is not allowed\nCall to 'open' is not allowed"
        );
    }

    #[test]
    fn test_rate_limited_is_transparent() {
        let err: DataChatError = RateLimitExceeded.into();
        assert_eq!(err.to_string(), "Rate limit exceeded. Please try again later.");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DataChatError = io_err.into();
        assert!(matches!(err, DataChatError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: DataChatError = json_err.into();
        assert!(matches!(err, DataChatError::Json(_)));
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: DataChatError = StorageError::NotFound("artifacts/c1/x.png".to_string()).into();
        assert!(matches!(err, DataChatError::Storage(_)));
        assert!(err.to_string().contains("artifacts/c1/x.png"));
    }
}
