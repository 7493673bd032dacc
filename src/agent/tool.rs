//! The `run_code_capture` tool: argument parsing plus validate-then-execute.

use serde::Deserialize;
use serde_json::json;

use crate::error::{DataChatError, Result};
use crate::llm::ToolDefinition;
use crate::sandbox::{Bindings, CodeValidator, ExecutionOutput, ExecutionResult, SandboxExecutor};

pub const RUN_CODE_TOOL: &str = "run_code_capture";

const RUN_CODE_DESCRIPTION: &str = "Execute Python code against the loaded dataframe `df` and \
capture stdout and local variables. Sandbox restricted: only the data-analysis libraries can be \
imported and files may only be written to `output_dir`.";

/// Schema advertised to the model: one required string field `code`, nothing else.
pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        RUN_CODE_TOOL,
        RUN_CODE_DESCRIPTION,
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string"}
            },
            "required": ["code"],
            "additionalProperties": false
        }),
    )
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CodeArguments {
    code: String,
}

/// The `code` field of a finalized arguments buffer.
pub fn parse_arguments(raw: &str) -> std::result::Result<String, String> {
    serde_json::from_str::<CodeArguments>(raw)
        .map(|args| args.code)
        .map_err(|e| format!("Invalid arguments for {}: {}", RUN_CODE_TOOL, e))
}

/// Validator and executor behind the tool. Cheap to clone into a blocking task.
#[derive(Debug, Clone)]
pub struct CodeRunner {
    validator: CodeValidator,
    executor: SandboxExecutor,
}

impl CodeRunner {
    pub fn new(validator: CodeValidator, executor: SandboxExecutor) -> Self {
        Self { validator, executor }
    }

    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    /// Validate `code` and run it only when no violation was found. Blocking.
    pub fn run(&self, code: &str, bindings: &Bindings) -> Result<ExecutionOutput> {
        let violations = self.validator.validate(code);
        if !violations.is_empty() {
            log::info!("Rejected snippet with {} violation(s)", violations.len());
            let messages = violations.into_iter().map(|v| v.message).collect();
            let rejected = DataChatError::Rejected(messages);
            return Ok(ExecutionOutput {
                result: ExecutionResult {
                    error: Some(rejected.to_string()),
                    ..Default::default()
                },
                scratch: None,
            });
        }
        self.executor.execute(code, bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_definition_schema() {
        let schema = definition().to_openai_schema();
        assert_eq!(schema["function"]["name"], "run_code_capture");
        assert_eq!(schema["function"]["parameters"]["required"][0], "code");
        assert_eq!(schema["function"]["parameters"]["additionalProperties"], false);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments(r#"{"code": "print(1)"}"#).unwrap(), "print(1)");
        assert!(parse_arguments(r#"{"code": 1}"#).is_err());
        assert!(parse_arguments(r#"{"code": "x", "extra": 1}"#).is_err());
        let err = parse_arguments(r#"{"co"#).unwrap_err();
        assert!(err.starts_with("Invalid arguments for run_code_capture"));
    }

    #[test]
    fn test_rejected_code_never_runs() {
        let root = tempdir().unwrap();
        let executor = SandboxExecutor::new(root.path(), 100_000);
        let runner = CodeRunner::new(CodeValidator::default(), executor);

        let output = runner.run("import os\nprint(os.getcwd())", &Vec::new()).unwrap();

        let error = output.result.error.unwrap();
        assert!(error.starts_with("Security Violations:"));
        assert!(error.contains("Import of 'os' is not allowed"));
        assert!(output.result.stdout.is_empty());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_code_runs() {
        let root = tempdir().unwrap();
        let executor = SandboxExecutor::new(root.path(), 100_000);
        let runner = CodeRunner::new(CodeValidator::default(), executor);
        let output = runner.run("a = 1 + 1\nprint(a)", &Vec::new()).unwrap();
        assert_eq!(output.result.stdout, "2\n");
    }
}
