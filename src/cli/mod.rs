//! CLI module for datachat - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for asking questions,
//! interactive chat, and running snippets through the sandbox directly.

pub mod commands;
pub mod render;

pub use commands::Cli;
