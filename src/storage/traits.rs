//! Object store trait and its error type.

use std::path::Path;

use async_trait::async_trait;

/// Errors raised by object store backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable blob storage addressed by slash-separated keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, returning the key or path it was written to.
    async fn upload(&self, bytes: Vec<u8>, key: &str) -> Result<String, StorageError>;

    /// Copy the object at `key` to `destination`.
    async fn download(&self, key: &str, destination: &Path) -> Result<(), StorageError>;

    /// Full contents of the object at `key`.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Reject keys that are empty, absolute, or climb out of the store root.
pub fn check_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key_accepts_artifact_keys() {
        assert!(check_key("artifacts/conv-1/abcd1234_plot.png").is_ok());
        assert!(check_key("data.csv").is_ok());
    }

    #[test]
    fn test_check_key_rejects_escapes() {
        for key in ["", "/etc/passwd", "a/../b", "a//b", "./a", "a\\b", "a/"] {
            assert!(matches!(check_key(key), Err(StorageError::InvalidKey(_))), "{}", key);
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(StorageError::NotFound("k".to_string()).to_string(), "Object not found: k");
        let err = StorageError::Upload {
            key: "k".to_string(),
            message: "quota".to_string(),
        };
        assert_eq!(err.to_string(), "Upload of k failed: quota");
    }
}
