//! CLI for the matchdl ingestion pipeline.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use matchdl_core::config::{self, MatchdlConfig};
use std::path::PathBuf;

use commands::{run_fetch_daily, run_status};

/// Top-level CLI for matchdl.
#[derive(Debug, Parser)]
#[command(name = "matchdl")]
#[command(about = "matchdl: budget-gated match ingestion", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/matchdl/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Retry the parse backlog, then discover and download new matches.
    FetchDaily {
        /// Max remote calls for this run (default: budget.daily_api_limit).
        #[arg(short = 'a', long, value_name = "N")]
        api_limit: Option<u32>,
        /// Max new matches per discovery query (default: discovery.batch_size).
        #[arg(short = 'b', long, value_name = "N")]
        batch_size: Option<u32>,
        /// Show what would be retried and queried; no remote calls, no writes.
        #[arg(short = 'd', long)]
        dry_run: bool,
    },

    /// Show counts of downloaded matches and backlog entries.
    Status,
}

impl Cli {
    fn load_config(&self) -> Result<MatchdlConfig> {
        match &self.config {
            Some(path) => config::load_from_path(path),
            None => config::load_or_init(),
        }
    }
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = cli.load_config()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::FetchDaily {
                api_limit,
                batch_size,
                dry_run,
            } => run_fetch_daily(&cfg, api_limit, batch_size, dry_run)?,
            CliCommand::Status => run_status(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
