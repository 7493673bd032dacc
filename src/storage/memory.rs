//! In-memory object store, with injectable upload failures for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use super::traits::{ObjectStore, StorageError, check_key};

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    failing_names: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads whose key ends in one of `names` fail.
    pub fn failing_on<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            failing_names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, bytes: Vec<u8>, key: &str) -> Result<String, StorageError> {
        check_key(key)?;
        if self.failing_names.iter().any(|name| key.ends_with(name.as_str())) {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), bytes);
        Ok(key.to_string())
    }

    async fn download(&self, key: &str, destination: &Path) -> Result<(), StorageError> {
        let bytes = self.read(key).await?;
        tokio::fs::write(destination, bytes).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();
        store.upload(b"hi".to_vec(), "a/b.txt").await.unwrap();
        assert_eq!(store.read("a/b.txt").await.unwrap(), b"hi");
        assert_eq!(store.keys(), vec!["a/b.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::failing_on(["bad.png"]);
        assert!(store.upload(b"x".to_vec(), "artifacts/c/1_bad.png").await.is_err());
        assert!(store.upload(b"x".to_vec(), "artifacts/c/1_good.png").await.is_ok());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_download_missing() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let err = store.download("x", &dir.path().join("x")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
