//! Filesystem-backed object store. Keys map to paths under a root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::traits::{ObjectStore, StorageError, check_key};

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create the store, making `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    fn not_found(key: &str, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn upload(&self, bytes: Vec<u8>, key: &str) -> Result<String, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        log::debug!("Stored {} ({} bytes) at {}", key, bytes.len(), path.display());
        Ok(key.to_string())
    }

    async fn download(&self, key: &str, destination: &Path) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if path == destination {
            return Ok(());
        }
        tokio::fs::copy(&path, destination)
            .await
            .map_err(|e| Self::not_found(key, e))?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| Self::not_found(key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_creates_nested_path() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        let key = store.upload(b"png".to_vec(), "artifacts/c1/ab_plot.png").await.unwrap();
        assert_eq!(key, "artifacts/c1/ab_plot.png");
        assert_eq!(std::fs::read(dir.path().join("artifacts/c1/ab_plot.png")).unwrap(), b"png");
        assert_eq!(store.read(&key).await.unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_download_copies() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path().join("store")).unwrap();
        store.upload(b"a,b\n1,2\n".to_vec(), "uploads/d.csv").await.unwrap();

        let dest = dir.path().join("copy.csv");
        store.download("uploads/d.csv", &dest).await.unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        let err = store.download("nope.csv", &dir.path().join("x")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(k) if k == "nope.csv"));
        assert!(matches!(store.read("nope.csv").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_escaping_key_rejected() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path().join("root")).unwrap();
        let err = store.upload(b"x".to_vec(), "../outside").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(!dir.path().join("outside").exists());
    }
}
