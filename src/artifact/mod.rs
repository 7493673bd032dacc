//! Artifact Module
//!
//! Files produced by sandboxed executions are persisted through the object
//! store and described by [`Artifact`] records. JSON reports are condensed into
//! text summaries for the model instead of being rendered.

mod collector;
mod report;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use collector::{ArtifactCollector, ArtifactFailure, CollectedArtifacts};
pub use report::summarize_report;

/// How an artifact is presented, decided by its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Report,
    Json,
    Other,
}

impl ArtifactKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" => Self::Image,
            "html" | "htm" => Self::Report,
            "json" => Self::Json,
            _ => Self::Other,
        }
    }

    /// Whether artifacts of this kind are shown to the end user.
    pub fn is_rendered(self) -> bool {
        self != Self::Json
    }
}

/// A produced file after it has been durably stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub original_name: String,
    pub kind: ArtifactKind,
    pub storage_key: String,
    pub public_url: String,
}

impl Artifact {
    /// Chat-renderable reference to the stored file.
    pub fn render(&self) -> String {
        match self.kind {
            ArtifactKind::Image => format!("![{}]({})", self.original_name, self.public_url),
            ArtifactKind::Report => format!(
                "<iframe src=\"{}\" title=\"{}\" width=\"100%\" height=\"600\" \
                 frameborder=\"0\"></iframe>",
                self.public_url, self.original_name
            ),
            ArtifactKind::Json | ArtifactKind::Other => {
                format!("[{}]({})", self.original_name, self.public_url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(ArtifactKind::from_path(Path::new("/tmp/a/plot.PNG")), ArtifactKind::Image);
        assert_eq!(ArtifactKind::from_path(Path::new("chart.svg")), ArtifactKind::Image);
        assert_eq!(ArtifactKind::from_path(Path::new("report.html")), ArtifactKind::Report);
        assert_eq!(ArtifactKind::from_path(Path::new("report.json")), ArtifactKind::Json);
        assert_eq!(ArtifactKind::from_path(Path::new("data.csv")), ArtifactKind::Other);
        assert_eq!(ArtifactKind::from_path(Path::new("noext")), ArtifactKind::Other);
    }

    #[test]
    fn test_render() {
        let mut artifact = Artifact {
            original_name: "plot.png".to_string(),
            kind: ArtifactKind::Image,
            storage_key: "artifacts/c/1_plot.png".to_string(),
            public_url: "/api/artifacts/artifacts/c/1_plot.png".to_string(),
        };
        assert_eq!(artifact.render(), "![plot.png](/api/artifacts/artifacts/c/1_plot.png)");

        artifact.kind = ArtifactKind::Report;
        assert!(artifact.render().starts_with("<iframe src=\"/api/artifacts/"));
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ArtifactKind::Report).unwrap(), "\"report\"");
    }
}
