//! Agent orchestration
//!
//! The loop that drives one conversation: model turns, tool dispatch and the
//! events a caller renders.

pub mod agent_loop;
pub mod events;
pub mod prompts;
pub mod tool;

pub use agent_loop::{AgentDeps, AgentLoop, DATASET_BINDING, LoopState, MAX_STEPS_MESSAGE};
pub use events::StreamEvent;
pub use prompts::format_system_prompt;
pub use tool::{CodeRunner, RUN_CODE_TOOL};
