//! Runs validated snippets in a fresh interpreter with a scoped output directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::interp::{self, Interpreter, Value};
use crate::config::SandboxConfig;
use crate::dataset::Dataset;
use crate::error::{DataChatError, Result};
use crate::id::generate_scratch_name;

/// Name under which the scratch directory path is bound.
pub const OUTPUT_DIR_BINDING: &str = "output_dir";

/// Rendered in place of a binding whose display string cannot be produced.
pub const UNSERIALIZABLE: &str = "<unserializable>";

/// Interpreter recursion is deep; run it on a thread with room for it.
const INTERPRETER_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Outcome of one execution. On error, bindings and artifact paths are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub error: Option<String>,
    pub bindings: IndexMap<String, String>,
    #[serde(rename = "artifacts")]
    pub artifact_paths: Vec<PathBuf>,
}

impl ExecutionResult {
    fn failed(stdout: String, error: String) -> Self {
        Self {
            stdout,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A value made available to the snippet before it runs.
#[derive(Debug, Clone)]
pub enum Binding {
    /// Bound as a `DataFrame`; every execution gets its own copy.
    Frame(Arc<Dataset>),
    /// Plain data converted to the matching interpreter value.
    Json(serde_json::Value),
}

pub type Bindings = Vec<(String, Binding)>;

/// Uniquely named per-execution directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(root: &Path) -> std::io::Result<Self> {
        let path = root.join(generate_scratch_name());
        fs::create_dir_all(&path)?;
        log::debug!("Created scratch directory {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Regular files directly inside the directory, sorted by name.
    pub fn files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                log::warn!("Failed to remove scratch directory {}: {}", self.path.display(), e);
            }
        }
    }
}

/// The result plus the scratch directory holding any produced files.
///
/// `scratch` is only present on success; the caller drains it and dropping it
/// removes whatever is left.
#[derive(Debug)]
pub struct ExecutionOutput {
    pub result: ExecutionResult,
    pub scratch: Option<ScratchDir>,
}

#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    scratch_root: PathBuf,
    max_operations: u64,
}

impl SandboxExecutor {
    pub fn new(scratch_root: impl Into<PathBuf>, max_operations: u64) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            max_operations,
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.scratch_root.clone(), config.max_operations)
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Run `source` once. The caller must have validated it.
    ///
    /// Faults raised by the snippet land in `result.error`; only a failure to
    /// set up the scratch directory or the interpreter thread is an `Err`.
    pub fn execute(&self, source: &str, bindings: &Bindings) -> Result<ExecutionOutput> {
        let scratch = ScratchDir::create(&self.scratch_root)
            .map_err(|e| sandbox_error("could not create output directory", e))?;

        let output_dir = scratch.path().to_path_buf();
        let source_owned = source.to_string();
        let bindings_owned = bindings.clone();
        let max_operations = self.max_operations;

        let handle = std::thread::Builder::new()
            .name("sandbox".to_string())
            .stack_size(INTERPRETER_STACK_BYTES)
            .spawn(move || run_snippet(&source_owned, &bindings_owned, output_dir, max_operations))
            .map_err(|e| DataChatError::Sandbox(format!("could not start interpreter: {}", e)))?;

        let (stdout, outcome) = handle
            .join()
            .map_err(|_| DataChatError::Sandbox("interpreter thread panicked".to_string()))?;

        let bindings = match outcome {
            Ok(bindings) => bindings,
            Err(error) => {
                log::debug!("Snippet failed: {}", error);
                return Ok(ExecutionOutput {
                    result: ExecutionResult::failed(stdout, error),
                    scratch: None,
                });
            }
        };

        let artifact_paths = scratch
            .files()
            .map_err(|e| sandbox_error("could not list output directory", e))?;
        log::debug!(
            "Snippet finished: {} bytes stdout, {} bindings, {} files",
            stdout.len(),
            bindings.len(),
            artifact_paths.len()
        );

        Ok(ExecutionOutput {
            result: ExecutionResult {
                stdout,
                error: None,
                bindings,
                artifact_paths,
            },
            scratch: Some(scratch),
        })
    }
}

type SnippetOutcome = (String, std::result::Result<IndexMap<String, String>, String>);

fn sandbox_error(context: &str, e: std::io::Error) -> DataChatError {
    DataChatError::Sandbox(format!("{}: {}", context, e))
}

fn run_snippet(
    source: &str,
    bindings: &Bindings,
    output_dir: PathBuf,
    max_operations: u64,
) -> SnippetOutcome {
    let mut interp = Interpreter::new(output_dir.clone(), max_operations);
    interp.bind(OUTPUT_DIR_BINDING, Value::str(&output_dir.to_string_lossy()));

    for (name, binding) in bindings {
        let value = match binding {
            Binding::Frame(dataset) => interp::dataset_value(dataset),
            Binding::Json(json) => match interp::json_value(json) {
                Ok(value) => value,
                Err(fault) => return (String::new(), Err(fault.to_string())),
            },
        };
        interp.bind(name, value);
    }

    let outcome = interp.run(source);
    let stdout = interp.take_stdout();
    match outcome {
        Ok(()) => (stdout, Ok(interp::render_bindings(interp.locals(), UNSERIALIZABLE))),
        Err(fault) => (stdout, Err(fault.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn executor(root: &Path) -> SandboxExecutor {
        SandboxExecutor::new(root, 1_000_000)
    }

    fn sample_dataset() -> Arc<Dataset> {
        Arc::new(Dataset::from_csv_reader("a,b\n1,x\n2,y\n3,z\n".as_bytes()).unwrap())
    }

    #[test]
    fn test_print_and_bindings() {
        let root = tempdir().unwrap();
        let output = executor(root.path()).execute("a = 1 + 1\nprint(a)", &Vec::new()).unwrap();

        assert_eq!(output.result.stdout, "2\n");
        assert_eq!(output.result.error, None);
        assert_eq!(output.result.bindings.get("a").map(String::as_str), Some("2"));
        assert!(output.result.artifact_paths.is_empty());
    }

    #[test]
    fn test_output_dir_is_bound_and_listed() {
        let root = tempdir().unwrap();
        let output = executor(root.path())
            .execute(
                "import pandas as pd\n\
                 d = pd.DataFrame({'x': [1, 2]})\n\
                 d.to_csv(output_dir + '/b.csv')\n\
                 d.to_json(output_dir + '/a.json')\n",
                &Vec::new(),
            )
            .unwrap();

        assert_eq!(output.result.error, None);
        let names: Vec<String> = output
            .result
            .artifact_paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json".to_string(), "b.csv".to_string()]);
        let scratch = output.scratch.as_ref().unwrap();
        assert!(scratch.path().starts_with(root.path()));
        assert_eq!(
            output.result.bindings.get(OUTPUT_DIR_BINDING).map(String::as_str),
            Some(scratch.path().to_string_lossy().as_ref())
        );
    }

    #[test]
    fn test_fault_discards_bindings_and_removes_scratch() {
        let root = tempdir().unwrap();
        let output = executor(root.path())
            .execute("x = 5\nprint('before')\ny = 1 / 0\n", &Vec::new())
            .unwrap();

        assert_eq!(output.result.stdout, "before\n");
        assert!(output.result.error.as_deref().unwrap().contains("ZeroDivisionError"));
        assert!(output.result.bindings.is_empty());
        assert!(output.scratch.is_none());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_scratch_removed_when_output_dropped() {
        let root = tempdir().unwrap();
        let output = executor(root.path())
            .execute(
                "import pandas as pd\npd.DataFrame({'x': [1]}).to_csv(output_dir + '/t.csv')\n",
                &Vec::new(),
            )
            .unwrap();
        let path = output.scratch.as_ref().unwrap().path().to_path_buf();
        assert!(path.exists());
        drop(output);
        assert!(!path.exists());
    }

    #[test]
    fn test_each_execution_gets_a_fresh_directory() {
        let root = tempdir().unwrap();
        let exec = executor(root.path());
        let a = exec.execute("pass", &Vec::new()).unwrap();
        let b = exec.execute("pass", &Vec::new()).unwrap();
        assert_ne!(a.scratch.unwrap().path(), b.scratch.unwrap().path());
    }

    #[test]
    fn test_dataset_binding_is_copied_per_execution() {
        let root = tempdir().unwrap();
        let exec = executor(root.path());
        let bindings: Bindings = vec![("df".to_string(), Binding::Frame(sample_dataset()))];

        let source = "df['a'] = df['a'] * 10\nprint(df['a'].sum())";
        let first = exec.execute(source, &bindings).unwrap();
        assert_eq!(first.result.stdout, "60\n");

        let second = exec.execute("print(df['a'].sum())", &bindings).unwrap();
        assert_eq!(second.result.stdout, "6\n");
    }

    #[test]
    fn test_json_binding() {
        let root = tempdir().unwrap();
        let bindings: Bindings = vec![("limit".to_string(), Binding::Json(serde_json::json!(3)))];
        let output = executor(root.path()).execute("print(limit * 2)", &bindings).unwrap();
        assert_eq!(output.result.stdout, "6\n");
    }

    #[test]
    fn test_modules_are_not_snapshotted() {
        let root = tempdir().unwrap();
        let output = executor(root.path())
            .execute("import numpy as np\nm = np.mean([1, 2, 3])", &Vec::new())
            .unwrap();
        assert!(!output.result.bindings.contains_key("np"));
        assert_eq!(output.result.bindings.get("m").map(String::as_str), Some("2.0"));
    }

    #[test]
    fn test_operation_budget() {
        let root = tempdir().unwrap();
        let output = SandboxExecutor::new(root.path(), 10_000)
            .execute("while True:\n    pass\n", &Vec::new())
            .unwrap();
        assert!(output.result.error.unwrap().contains("operation budget exhausted"));
    }

    #[test]
    fn test_oversized_allocation_is_reported() {
        let root = tempdir().unwrap();
        let exec = executor(root.path());

        let output = exec.execute("s = 'a' * (10 ** 11)\n", &Vec::new()).unwrap();
        assert!(output.result.error.unwrap().starts_with("MemoryError"));

        let output = exec.execute("x = [0] * (10 ** 6)\ny = x * 100000\n", &Vec::new()).unwrap();
        assert!(output.result.error.unwrap().starts_with("MemoryError"));

        let output = exec.execute("print(len([0] * 1000))", &Vec::new()).unwrap();
        assert_eq!(output.result.stdout, "1000\n");
    }

    #[test]
    fn test_integer_overflow_prints_float() {
        let root = tempdir().unwrap();
        let output = executor(root.path())
            .execute("print(2 ** 100)\nprint(2 ** 62 + 2 ** 62)", &Vec::new())
            .unwrap();
        assert_eq!(output.result.error, None);
        assert_eq!(output.result.stdout, "1.2676506002282294e+30\n9.223372036854776e+18\n");
    }

    #[test]
    fn test_writes_outside_output_dir_fail() {
        let root = tempdir().unwrap();
        let output = executor(root.path())
            .execute(
                "import pandas as pd\npd.DataFrame({'x': [1]}).to_csv('../escape.csv')\n",
                &Vec::new(),
            )
            .unwrap();
        assert!(output.result.error.unwrap().contains("PermissionError"));
        assert!(!root.path().join("escape.csv").exists());
    }

    #[test]
    fn test_result_serializes_with_artifacts_key() {
        let result = ExecutionResult {
            stdout: "ok\n".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["stdout"], "ok\n");
        assert!(value["error"].is_null());
        assert!(value["artifacts"].as_array().unwrap().is_empty());
    }
}
