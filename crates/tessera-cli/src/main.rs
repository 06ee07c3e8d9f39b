//! Tessera CLI - chat with notes and watch background tasks from a terminal

mod app;
mod args;
mod commands;
mod console;

use anyhow::Context;
use args::{Cli, Commands};
use clap::Parser;
use console::CliConsole;
use tessera_core::config::{ConfigLoader, LogFormat, TesseraConfig};
use tessera_core::error::{TesseraError, UserFriendlyError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config, cli.verbose);

    let console = CliConsole::new(cli.verbose);
    let result = run(cli, config, &console).await;
    if let Err(error) = &result {
        report_failure(&console, error);
    }
    result
}

fn report_failure(console: &CliConsole, error: &anyhow::Error) {
    console.error(&format!("{error:#}"));
    if let Some(error) = error.downcast_ref::<TesseraError>() {
        for suggestion in UserFriendlyError::from(error).suggestions {
            eprintln!("  → {suggestion}");
        }
    }
}

async fn run(cli: Cli, config: TesseraConfig, console: &CliConsole) -> anyhow::Result<()> {
    let engine = app::Engine::new(config)?;
    match cli.command {
        Commands::Chat { message } => commands::chat::run(&engine, console, &message.join(" ")).await,
        Commands::Tasks { status, tree } => commands::tasks::list(&engine, console, &status, tree).await,
        Commands::Agents => commands::tasks::agents(&engine, console).await,
        Commands::Logs { task_id } => commands::tasks::logs(&engine, console, &task_id).await,
        Commands::Cancel { task_id } => commands::tasks::cancel(&engine, console, &task_id).await,
        Commands::StopAll => commands::tasks::stop_all(&engine, console).await,
        Commands::Watch { interval } => commands::watch::run(&engine, console, interval).await,
    }
}

/// Defaults, then the config file, then `TESSERA_*` variables
fn load_config(cli: &Cli) -> anyhow::Result<TesseraConfig> {
    let mut loader = ConfigLoader::new().with_defaults();
    match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            loader = loader.with_file(path);
        }
        None => {
            if let Some(path) = TesseraConfig::default_path() {
                loader = loader.with_file(path);
            }
        }
    }
    loader
        .with_env()
        .load()
        .context("failed to load configuration")
}

/// `RUST_LOG` wins over the configured level; `--verbose` forces debug
fn init_tracing(config: &TesseraConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
        })
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
