//! CLI command definitions.

use clap::{Args, Subcommand};
use reclaim_core::job::DEFAULT_PRIORITY;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a batch of recovery jobs to completion
    Run(RunArgs),

    /// Inspect cache snapshots
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Files to recover
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Worker program (overrides `worker.program`)
    #[arg(short, long, env = "RECLAIM_WORKER")]
    pub worker: Option<String>,

    /// Worker argument, repeatable; `{target}` is replaced per job
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Priority for every job (1-10, higher runs first)
    #[arg(short, long, default_value_t = DEFAULT_PRIORITY, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub priority: u8,

    /// Jobs running at once
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Retries after a failed attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Attack mode passed to the worker
    #[arg(long)]
    pub mode: Option<String>,

    /// Cache snapshot restored before and saved after the batch
    #[arg(long, env = "RECLAIM_CACHE_SNAPSHOT")]
    pub cache_snapshot: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show what a snapshot file contains
    Inspect {
        /// Snapshot path
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the configuration file location
    Path,
}
