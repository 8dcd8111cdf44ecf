//! Reclaim CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod display;
mod handlers;

use commands::{CacheCommands, Commands, ConfigCommands};
use config::ReclaimConfig;

#[derive(Parser, Debug)]
#[command(name = "reclaim")]
#[command(author, version, about = "Batch credential recovery with learned patterns", long_about = None)]
struct Cli {
    /// Configuration file (default: reclaim.yaml in the platform config dir)
    #[arg(short, long, global = true, env = "RECLAIM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let load = || ReclaimConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Run(args) => handlers::run_batch(load()?, args).await?,
        Commands::Cache { command } => match command {
            CacheCommands::Inspect { path } => handlers::inspect_cache(&load()?, &path).await?,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&load()?)?,
            ConfigCommands::Path => handlers::config_path(cli.config.as_deref())?,
        },
    }

    Ok(())
}
