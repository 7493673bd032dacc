//! Static gate in front of the sandbox.
//!
//! Walks the syntax tree once and flags two node categories: imports whose
//! top-level module is not allow-listed, and calls whose callee is a bare
//! name on the deny-list. A non-empty result means the snippet must not run.
//!
//! Known limitation: only bare-name callees are checked, so `x.open(...)` or
//! an aliased reference to a denied builtin is not caught here. The
//! interpreter has no file, process or reflection primitives to reach through
//! such a path, which is what actually contains it.

use std::collections::BTreeSet;
use std::fmt;

use tree_sitter::Node;

use super::parser::{first_syntax_error, node_text, parse};
use crate::config::SandboxConfig;

/// Why a submission was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityViolation {
    pub message: String,
}

impl SecurityViolation {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SecurityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Allow/deny tables consulted by the validator.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    allowed_modules: BTreeSet<String>,
    denied_calls: BTreeSet<String>,
}

impl SandboxPolicy {
    pub fn new<M, C>(allowed_modules: M, denied_calls: C) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            allowed_modules: allowed_modules.into_iter().map(Into::into).collect(),
            denied_calls: denied_calls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.allowed_modules.iter().cloned(), config.denied_calls.iter().cloned())
    }

    /// Whether the top-level segment of a dotted module name is allowed.
    pub fn allows_module(&self, module: &str) -> bool {
        let top = module.split('.').next().unwrap_or(module);
        self.allowed_modules.contains(top)
    }

    pub fn denies_call(&self, name: &str) -> bool {
        self.denied_calls.contains(name)
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

/// Pure, deterministic snippet checker.
#[derive(Debug, Clone, Default)]
pub struct CodeValidator {
    policy: SandboxPolicy,
}

impl CodeValidator {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Every violation in `source`, in document order. Empty means acceptable.
    pub fn validate(&self, source: &str) -> Vec<SecurityViolation> {
        let Some(tree) = parse(source) else {
            return vec![SecurityViolation::new("SyntaxError: source could not be parsed")];
        };
        let root = tree.root_node();

        if let Some(pos) = first_syntax_error(root) {
            return vec![SecurityViolation::new(format!(
                "SyntaxError: invalid syntax (line {}, column {})",
                pos.line, pos.column
            ))];
        }

        let mut violations = Vec::new();
        let mut cursor = root.walk();

        loop {
            let node = cursor.node();
            match node.kind() {
                "import_statement" => self.check_import(&node, source, &mut violations),
                "import_from_statement" => self.check_import_from(&node, source, &mut violations),
                "call" => self.check_call(&node, source, &mut violations),
                _ => {}
            }

            if cursor.goto_first_child() {
                continue;
            }

            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    return violations;
                }
            }
        }
    }

    fn check_import(&self, node: &Node, source: &str, out: &mut Vec<SecurityViolation>) {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let dotted = if name.kind() == "aliased_import" {
                name.child_by_field_name("name")
            } else {
                Some(name)
            };
            let Some(dotted) = dotted else { continue };
            let module = node_text(&dotted, source);
            if !self.policy.allows_module(module) {
                out.push(SecurityViolation::new(format!("Import of '{}' is not allowed", module)));
            }
        }
    }

    fn check_import_from(&self, node: &Node, source: &str, out: &mut Vec<SecurityViolation>) {
        let Some(module) = node.child_by_field_name("module_name") else {
            return;
        };
        let text = node_text(&module, source);
        // Relative imports have nothing to resolve against inside the sandbox.
        if module.kind() == "relative_import" || !self.policy.allows_module(text) {
            out.push(SecurityViolation::new(format!("Import from '{}' is not allowed", text)));
        }
    }

    fn check_call(&self, node: &Node, source: &str, out: &mut Vec<SecurityViolation>) {
        let Some(callee) = node.child_by_field_name("function") else {
            return;
        };
        if callee.kind() != "identifier" {
            return;
        }
        let name = node_text(&callee, source);
        if self.policy.denies_call(name) {
            out.push(SecurityViolation::new(format!("Call to '{}' is not allowed", name)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(source: &str) -> Vec<String> {
        CodeValidator::default()
            .validate(source)
            .into_iter()
            .map(|v| v.message)
            .collect()
    }

    #[test]
    fn test_plain_arithmetic_is_clean() {
        assert!(messages("a = 1 + 1\nprint(a)").is_empty());
    }

    #[test]
    fn test_allowed_imports_are_clean() {
        let source = "import pandas as pd\n\
                      import numpy as np\n\
                      import matplotlib.pyplot as plt\n\
                      from scipy import stats\n\
                      from datetime import datetime\n";
        assert!(messages(source).is_empty());
    }

    #[test]
    fn test_disallowed_import_names_module() {
        let found = messages("import os\nprint(os.getcwd())");
        assert!(found.contains(&"Import of 'os' is not allowed".to_string()));
    }

    #[test]
    fn test_dotted_import_reports_full_name() {
        let found = messages("import os.path as p");
        assert_eq!(found, vec!["Import of 'os.path' is not allowed".to_string()]);
    }

    #[test]
    fn test_import_from_disallowed() {
        let found = messages("from subprocess import run");
        assert_eq!(found, vec!["Import from 'subprocess' is not allowed".to_string()]);
    }

    #[test]
    fn test_relative_import_rejected() {
        let found = messages("from . import helpers");
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("Import from '.'"));
    }

    #[test]
    fn test_denied_call() {
        let found = messages("open('x','w')");
        assert!(found.contains(&"Call to 'open' is not allowed".to_string()));
    }

    #[test]
    fn test_nested_denied_call() {
        let found = messages("def f():\n    return [eval(s) for s in ['1']]\n");
        assert_eq!(found, vec!["Call to 'eval' is not allowed".to_string()]);
    }

    #[test]
    fn test_attribute_call_not_flagged() {
        // Only bare names are checked statically.
        assert!(messages("import pandas as pd\npd.open('x')").is_empty());
    }

    #[test]
    fn test_all_violations_reported_in_order() {
        let found = messages("import os\nimport sys\nexec('1')\n");
        assert_eq!(
            found,
            vec![
                "Import of 'os' is not allowed".to_string(),
                "Import of 'sys' is not allowed".to_string(),
                "Call to 'exec' is not allowed".to_string(),
            ]
        );
    }

    #[test]
    fn test_syntax_error_is_single_violation() {
        let found = messages("def broken(:\n    pass\nimport os\n");
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("SyntaxError:"));
    }

    #[test]
    fn test_custom_policy() {
        let validator = CodeValidator::new(SandboxPolicy::new(["json"], ["print"]));
        let found: Vec<String> = validator
            .validate("import json\nimport math\nprint(1)")
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(
            found,
            vec![
                "Import of 'math' is not allowed".to_string(),
                "Call to 'print' is not allowed".to_string(),
            ]
        );
    }

    #[test]
    fn test_validate_is_deterministic() {
        let source = "import os\nopen('a')\n";
        assert_eq!(messages(source), messages(source));
    }
}
