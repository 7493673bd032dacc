use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level modules generated code may import.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "math",
    "datetime",
    "pandas",
    "numpy",
    "matplotlib",
    "plotly",
    "seaborn",
    "ydata_profiling",
    "scipy",
];

/// Bare names generated code may never call.
pub const DEFAULT_DENIED_CALLS: &[&str] = &[
    "__import__",
    "open",
    "exec",
    "eval",
    "compile",
    "globals",
    "locals",
    "vars",
    "super",
    "input",
    "exit",
    "quit",
    "breakpoint",
    "getattr",
    "setattr",
    "delattr",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub rate_limit: RateLimitConfig,
    pub sandbox: SandboxConfig,
    pub storage: StorageConfig,
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "mistralai/devstral-2512:free".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            timeout_ms: 300000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_steps: 6 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub allowed_modules: Vec<String>,
    pub denied_calls: Vec<String>,
    pub scratch_root: PathBuf,
    pub max_operations: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowed_modules: DEFAULT_ALLOWED_MODULES.iter().map(|s| s.to_string()).collect(),
            denied_calls: DEFAULT_DENIED_CALLS.iter().map(|s| s.to_string()).collect(),
            scratch_root: std::env::temp_dir(),
            max_operations: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub url_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("datachat")
                .join("uploads"),
            url_prefix: "/api/artifacts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub report_summary_chars: usize,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            report_summary_chars: 2000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
            rate_limit: RateLimitConfig::default(),
            sandbox: SandboxConfig::default(),
            storage: StorageConfig::default(),
            artifacts: ArtifactsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config =
                config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!(
                            "Failed to load config from {}: {}",
                            primary_config.display(),
                            e
                        );
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.model, "mistralai/devstral-2512:free");
        assert_eq!(config.agent.max_steps, 6);
        assert_eq!(config.rate_limit.capacity, 10);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert!(config.sandbox.allowed_modules.iter().any(|m| m == "pandas"));
        assert!(config.sandbox.denied_calls.iter().any(|m| m == "open"));
        assert_eq!(config.storage.url_prefix, "/api/artifacts");
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "agent:\n  max_steps: 2\nrate_limit:\n  capacity: 3").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.agent.max_steps, 2);
        assert_eq!(config.rate_limit.capacity, 3);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.llm.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let path = PathBuf::from("/nonexistent/datachat.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
