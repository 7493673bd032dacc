//! Sandbox - static validation and restricted execution of generated snippets
//!
//! - `validator`: deny-list gate run before anything executes
//! - `executor`: runs a validated snippet in a fresh interpreter with a scoped output directory
//! - `interp`: the interpreter itself

pub mod executor;
pub mod interp;
pub mod parser;
pub mod validator;

pub use executor::{
    Binding, Bindings, ExecutionOutput, ExecutionResult, OUTPUT_DIR_BINDING, SandboxExecutor,
    ScratchDir, UNSERIALIZABLE,
};
pub use validator::{CodeValidator, SandboxPolicy, SecurityViolation};
