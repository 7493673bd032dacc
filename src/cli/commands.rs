//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - ask: one question against a CSV, events streamed to stdout
//! - chat: interactive conversation over stdin
//! - check: run the static validator on a snippet file
//! - exec: validate and execute a snippet without a model

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Datachat - ask questions about a CSV and let a model compute the answers
#[derive(Parser, Debug)]
#[command(name = "datachat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask one question about a dataset
    Ask {
        /// CSV file loaded as `df`
        #[arg(long)]
        csv: PathBuf,

        /// Scope id used to namespace stored artifacts
        #[arg(short, long)]
        scope: Option<String>,

        /// Print colored text instead of newline-delimited JSON events
        #[arg(short, long)]
        pretty: bool,

        /// The question
        question: String,
    },

    /// Interactive conversation about a dataset
    Chat {
        /// CSV file loaded as `df`
        #[arg(long)]
        csv: PathBuf,
    },

    /// Run the static validator on a snippet file
    Check {
        /// Python snippet to validate
        file: PathBuf,
    },

    /// Validate and execute a snippet, persisting what it produces
    Exec {
        /// CSV file loaded as `df`
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Scope id used to namespace stored artifacts
        #[arg(short, long)]
        scope: Option<String>,

        /// Python snippet file
        snippet: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["datachat"]).is_err());
    }

    #[test]
    fn test_cli_global_flags() {
        let args = ["datachat", "-v", "-c", "/path/to/datachat.yml", "check", "a.py"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/datachat.yml")));
    }

    #[test]
    fn test_ask_command() {
        let args = ["datachat", "ask", "--csv", "sales.csv", "What is the total?"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Ask {
                csv,
                scope,
                pretty,
                question,
            } => {
                assert_eq!(csv, PathBuf::from("sales.csv"));
                assert!(scope.is_none());
                assert!(!pretty);
                assert_eq!(question, "What is the total?");
            }
            _ => panic!("Expected ask command"),
        }
    }

    #[test]
    fn test_ask_with_scope_and_pretty() {
        let args = ["datachat", "ask", "--csv", "a.csv", "-s", "conv-1", "--pretty", "why?"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Ask { scope, pretty, .. } => {
                assert_eq!(scope.as_deref(), Some("conv-1"));
                assert!(pretty);
            }
            _ => panic!("Expected ask command"),
        }
    }

    #[test]
    fn test_ask_requires_csv() {
        assert!(Cli::try_parse_from(["datachat", "ask", "why?"]).is_err());
    }

    #[test]
    fn test_chat_command() {
        let cli = Cli::try_parse_from(["datachat", "chat", "--csv", "a.csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Chat { csv } if csv == PathBuf::from("a.csv")));
    }

    #[test]
    fn test_exec_without_csv() {
        let cli = Cli::try_parse_from(["datachat", "exec", "snippet.py"]).unwrap();
        match cli.command {
            Commands::Exec { csv, snippet, .. } => {
                assert!(csv.is_none());
                assert_eq!(snippet, PathBuf::from("snippet.py"));
            }
            _ => panic!("Expected exec command"),
        }
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }
}
