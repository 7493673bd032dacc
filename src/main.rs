use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use futures::StreamExt;
use log::info;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use datachat::agent::{AgentDeps, AgentLoop, CodeRunner, DATASET_BINDING, StreamEvent};
use datachat::artifact::ArtifactCollector;
use datachat::config::Config;
use datachat::dataset::Dataset;
use datachat::id::generate_conversation_id;
use datachat::llm::{OpenAiClient, OpenAiConfig, Role};
use datachat::ratelimit::RateLimiter;
use datachat::sandbox::{Binding, CodeValidator, SandboxExecutor, SandboxPolicy};
use datachat::storage::FsStore;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datachat")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("datachat.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();
    builder.parse_filters(level.unwrap_or("info"));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn load_dataset(path: &Path) -> Result<Arc<Dataset>> {
    let dataset = Dataset::from_csv_path(path)
        .context(format!("Failed to load dataset {}", path.display()))?;
    info!(
        "Loaded {} rows x {} columns from {}",
        dataset.len(),
        dataset.columns().len(),
        path.display()
    );
    Ok(Arc::new(dataset))
}

fn build_collector(config: &Config) -> Result<ArtifactCollector> {
    let store = FsStore::new(&config.storage.root).context("Failed to open artifact store")?;
    Ok(ArtifactCollector::from_config(Arc::new(store), &config.storage, &config.artifacts))
}

fn build_deps(config: &Config) -> Result<AgentDeps> {
    let client = OpenAiClient::new(OpenAiConfig::from(&config.llm), &config.llm.api_key_env)
        .context("Failed to create model client")?;
    Ok(AgentDeps {
        client: Arc::new(client),
        limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
        executor: SandboxExecutor::from_config(&config.sandbox),
        collector: build_collector(config)?,
    })
}

fn print_event(event: &StreamEvent, pretty: bool) {
    if !pretty {
        println!("{}", event.to_json_line());
        return;
    }
    if cli::render::is_inline(event) {
        print!("{}", cli::render::pretty(event));
        let _ = std::io::stdout().flush();
    } else {
        println!("{}", cli::render::pretty(event));
    }
}

/// Run one user turn, printing events as they arrive. Returns false when the run failed.
async fn run_turn(agent: &mut AgentLoop, question: &str, pretty: bool) -> Result<bool> {
    agent.add_message(Role::User, question)?;
    let mut failed = false;
    {
        let events = agent.run();
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            failed |= matches!(event, StreamEvent::Error(_));
            print_event(&event, pretty);
        }
    }
    if pretty {
        println!();
    }
    Ok(!failed)
}

async fn handle_ask_command(
    csv: &Path,
    scope: Option<&str>,
    pretty: bool,
    question: &str,
    config: &Config,
) -> Result<()> {
    info!("Asking: {}", question);
    let dataset = load_dataset(csv)?;
    let mut agent = AgentLoop::new(config, build_deps(config)?).with_dataset(dataset);
    if let Some(scope) = scope {
        agent = agent.with_scope(scope);
    }

    if !run_turn(&mut agent, question, pretty).await? {
        eyre::bail!("Agent run failed");
    }
    Ok(())
}

async fn handle_chat_command(csv: &Path, config: &Config) -> Result<()> {
    let dataset = load_dataset(csv)?;
    println!(
        "{} {} ({} rows). Type 'exit' to quit.",
        "Loaded".green(),
        csv.display(),
        dataset.len()
    );
    let mut agent = AgentLoop::new(config, build_deps(config)?).with_dataset(dataset);
    info!("Chat started: {}", agent.scope_id());

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".bold());
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        run_turn(&mut agent, line, true).await?;
    }
    Ok(())
}

fn handle_check_command(file: &Path, config: &Config) -> Result<()> {
    let source = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let validator = CodeValidator::new(SandboxPolicy::from_config(&config.sandbox));
    let violations = validator.validate(&source);

    if violations.is_empty() {
        println!("{} {}", "OK:".green(), file.display());
        return Ok(());
    }
    for violation in &violations {
        println!("{} {}", "Violation:".red(), violation);
    }
    eyre::bail!("{} violation(s) in {}", violations.len(), file.display())
}

async fn handle_exec_command(
    csv: Option<&Path>,
    scope: Option<&str>,
    snippet: &Path,
    config: &Config,
) -> Result<()> {
    let source =
        fs::read_to_string(snippet).context(format!("Failed to read {}", snippet.display()))?;
    let mut bindings = Vec::new();
    if let Some(csv) = csv {
        bindings.push((DATASET_BINDING.to_string(), Binding::Frame(load_dataset(csv)?)));
    }

    let runner = CodeRunner::new(
        CodeValidator::new(SandboxPolicy::from_config(&config.sandbox)),
        SandboxExecutor::from_config(&config.sandbox),
    );
    let output = tokio::task::spawn_blocking(move || runner.run(&source, &bindings))
        .await
        .context("Sandbox task failed")??;

    let mut result = output.result;
    let mut artifacts = Vec::new();
    if !result.is_error() {
        let scope = scope.map(str::to_string).unwrap_or_else(generate_conversation_id);
        let collected = build_collector(config)?.persist(&result.artifact_paths, &scope).await;
        drop(output.scratch);
        result.stdout = collected.augment_stdout(&result.stdout);
        result.artifact_paths = collected.file_names().into_iter().map(PathBuf::from).collect();
        artifacts = collected.artifacts;
    }

    let report = serde_json::json!({ "result": result, "artifacts": artifacts });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Ask {
            csv,
            scope,
            pretty,
            question,
        } => handle_ask_command(csv, scope.as_deref(), *pretty, question, config).await,
        Commands::Chat { csv } => handle_chat_command(csv, config).await,
        Commands::Check { file } => handle_check_command(file, config),
        Commands::Exec { csv, scope, snippet } => {
            handle_exec_command(csv.as_deref(), scope.as_deref(), snippet, config).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the configured level is known
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
