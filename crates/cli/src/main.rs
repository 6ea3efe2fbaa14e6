use anyhow::Context;
use clap::{Parser, Subcommand};
use optdesk_core::{AppConfig, ConfigLoader};
use std::path::{Path, PathBuf};

mod commands;

use commands::{CheckConfigArgs, ReconcileArgs, SimulateArgs};

#[derive(Parser)]
#[command(name = "optdesk")]
#[command(about = "Options strategy desk: lifecycle engine, paper execution and reconciliation", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one strategy against synthetic market data on the paper broker
    Simulate(SimulateArgs),
    /// List execution groups the journal never saw complete
    Reconcile(ReconcileArgs),
    /// Load and print the effective configuration
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_from(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    init_tracing(&config)?;

    match cli.command {
        Commands::Simulate(args) => commands::run_simulate(args, &config).await?,
        Commands::Reconcile(args) => commands::run_reconcile(args, &config)?,
        Commands::CheckConfig(args) => commands::run_check_config(args, &config, &cli.config)?,
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr unless a
/// log file is configured.
fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = open_log_file(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> anyhow::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}
