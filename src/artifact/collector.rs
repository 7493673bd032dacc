//! Moves files out of an execution's scratch directory into the object store.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::report::summarize_report;
use super::{Artifact, ArtifactKind};
use crate::config::{ArtifactsConfig, StorageConfig};
use crate::id::generate_artifact_key;
use crate::storage::ObjectStore;

/// One file that could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFailure {
    pub original_name: String,
    pub message: String,
}

/// Outcome of one [`ArtifactCollector::persist`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedArtifacts {
    /// Every stored file, in input order.
    pub artifacts: Vec<Artifact>,
    /// Condensed summaries of stored JSON reports.
    pub report_summaries: Vec<String>,
    pub failures: Vec<ArtifactFailure>,
}

impl CollectedArtifacts {
    /// Stored artifacts that are shown to the end user.
    pub fn rendered(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(|a| a.kind.is_rendered())
    }

    /// `stdout` with report summaries and persist failures appended.
    pub fn augment_stdout(&self, stdout: &str) -> String {
        let mut out = stdout.to_string();
        for summary in &self.report_summaries {
            push_block(&mut out, summary);
        }
        for failure in &self.failures {
            push_block(
                &mut out,
                &format!("Failed to save artifact {}: {}", failure.original_name, failure.message),
            );
        }
        out
    }

    pub fn file_names(&self) -> Vec<String> {
        self.artifacts.iter().map(|a| a.original_name.clone()).collect()
    }
}

fn push_block(out: &mut String, block: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(block);
}

#[derive(Clone)]
pub struct ArtifactCollector {
    store: Arc<dyn ObjectStore>,
    url_prefix: String,
    summary_chars: usize,
}

impl std::fmt::Debug for ArtifactCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCollector")
            .field("url_prefix", &self.url_prefix)
            .field("summary_chars", &self.summary_chars)
            .finish_non_exhaustive()
    }
}

impl ArtifactCollector {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        url_prefix: impl Into<String>,
        summary_chars: usize,
    ) -> Self {
        Self {
            store,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            summary_chars,
        }
    }

    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        storage: &StorageConfig,
        artifacts: &ArtifactsConfig,
    ) -> Self {
        Self::new(store, storage.url_prefix.clone(), artifacts.report_summary_chars)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix, key)
    }

    /// Store every file in `paths` under `scope_id`.
    ///
    /// A failed upload is recorded and the remaining files are still processed.
    /// Stored files are deleted from scratch, and each scratch directory that
    /// ends up empty is removed.
    pub async fn persist(&self, paths: &[PathBuf], scope_id: &str) -> CollectedArtifacts {
        let mut collected = CollectedArtifacts::default();
        let mut dirs = BTreeSet::new();

        for path in paths {
            let original_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            if let Some(parent) = path.parent() {
                dirs.insert(parent.to_path_buf());
            }

            match self.persist_one(path, &original_name, scope_id).await {
                Ok((artifact, bytes)) => {
                    if artifact.kind == ArtifactKind::Json {
                        let text = String::from_utf8_lossy(&bytes);
                        collected
                            .report_summaries
                            .push(summarize_report(&original_name, &text, self.summary_chars));
                    }
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        log::warn!("Failed to delete scratch file {}: {}", path.display(), e);
                    }
                    tracing::info!(
                        key = %artifact.storage_key,
                        kind = ?artifact.kind,
                        "Stored artifact"
                    );
                    collected.artifacts.push(artifact);
                }
                Err(message) => {
                    log::error!("Failed to store artifact {}: {}", path.display(), message);
                    collected.failures.push(ArtifactFailure { original_name, message });
                }
            }
        }

        for dir in dirs {
            remove_if_empty(&dir).await;
        }
        collected
    }

    async fn persist_one(
        &self,
        path: &Path,
        name: &str,
        scope_id: &str,
    ) -> Result<(Artifact, Vec<u8>), String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
        let key = generate_artifact_key(scope_id, name);
        let stored_key = self
            .store
            .upload(bytes.clone(), &key)
            .await
            .map_err(|e| e.to_string())?;
        let artifact = Artifact {
            original_name: name.to_string(),
            kind: ArtifactKind::from_path(path),
            public_url: self.public_url(&stored_key),
            storage_key: stored_key,
        };
        Ok((artifact, bytes))
    }
}

async fn remove_if_empty(dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    if let Ok(None) = entries.next_entry().await {
        match tokio::fs::remove_dir(dir).await {
            Ok(()) => log::debug!("Removed scratch directory {}", dir.display()),
            Err(e) => log::warn!("Failed to remove scratch directory {}: {}", dir.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use tempfile::tempdir;

    fn collector(store: Arc<MemoryStore>) -> ArtifactCollector {
        ArtifactCollector::new(store, "/api/artifacts/", 2000)
    }

    fn scratch_with(files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf, Vec<PathBuf>) {
        let root = tempdir().unwrap();
        let scratch = root.path().join("agent_artifacts_1");
        std::fs::create_dir(&scratch).unwrap();
        let paths = files
            .iter()
            .map(|(name, body)| {
                let p = scratch.join(name);
                std::fs::write(&p, body).unwrap();
                p
            })
            .collect();
        (root, scratch, paths)
    }

    #[tokio::test]
    async fn test_persist_stores_and_cleans_up() {
        let store = Arc::new(MemoryStore::new());
        let (_root, scratch, paths) =
            scratch_with(&[("plot.png", "png"), ("report.html", "<html></html>")]);

        let collected = collector(store.clone()).persist(&paths, "conv-1").await;

        assert!(collected.failures.is_empty());
        assert_eq!(collected.artifacts.len(), 2);
        let png = &collected.artifacts[0];
        assert_eq!(png.original_name, "plot.png");
        assert_eq!(png.kind, ArtifactKind::Image);
        assert!(png.storage_key.starts_with("artifacts/conv-1/"));
        assert!(png.storage_key.ends_with("_plot.png"));
        assert_eq!(png.public_url, format!("/api/artifacts/{}", png.storage_key));
        assert_eq!(collected.artifacts[1].kind, ArtifactKind::Report);
        assert_eq!(store.len(), 2);
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let store = Arc::new(MemoryStore::failing_on(["bad.png"]));
        let (_root, scratch, paths) = scratch_with(&[("bad.png", "x"), ("good.png", "y")]);

        let collected = collector(store.clone()).persist(&paths, "c").await;

        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].original_name, "bad.png");
        assert_eq!(collected.file_names(), vec!["good.png".to_string()]);
        // The failed file stays behind, so the directory is kept for its owner to drop.
        assert!(scratch.join("bad.png").exists());
        assert!(!scratch.join("good.png").exists());
        assert!(collected.augment_stdout("").contains("Failed to save artifact bad.png"));
    }

    #[tokio::test]
    async fn test_json_report_is_summarized_not_rendered() {
        let store = Arc::new(MemoryStore::new());
        let (_root, _scratch, paths) = scratch_with(&[
            ("report.json", r#"{"alerts": ["x is constant"], "variables": {}}"#),
            ("plot.png", "p"),
        ]);

        let collected = collector(store).persist(&paths, "c").await;

        assert_eq!(collected.artifacts.len(), 2);
        let rendered: Vec<&str> = collected.rendered().map(|a| a.original_name.as_str()).collect();
        assert_eq!(rendered, vec!["plot.png"]);
        let stdout = collected.augment_stdout("Computed stuff.");
        assert!(stdout.starts_with("Computed stuff.\n\n[report.json] Report summary"));
        assert!(stdout.contains("- x is constant"));
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let collected = collector(store.clone()).persist(&[], "c").await;
        assert_eq!(collected, CollectedArtifacts::default());
        let again = collector(store.clone()).persist(&[], "c").await;
        assert_eq!(again, CollectedArtifacts::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_scratch_file_is_a_failure() {
        let store = Arc::new(MemoryStore::new());
        let collected = collector(store)
            .persist(&[PathBuf::from("/nonexistent/agent_artifacts_x/gone.png")], "c")
            .await;
        assert_eq!(collected.failures.len(), 1);
        assert!(collected.artifacts.is_empty());
    }
}
