// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Lifecycle Governance CLI
//!
//! The `aegis-governance` binary drives requests through the governance
//! lifecycle in-process.
//!
//! ## Commands
//!
//! - `aegis-governance run <QUERY>` - Govern one request from PREFLIGHT to FINAL
//! - `aegis-governance checkpoint list|latest <SESSION_ID>` - Inspect saved snapshots
//! - `aegis-governance config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use aegis_governance_cli::commands::{self, CheckpointCommand, ConfigCommand, RunCommand};

/// AEGIS Lifecycle Governance - every request, every stage, on the record
#[derive(Parser)]
#[command(name = "aegis-governance")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AEGIS_GOVERNANCE_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Govern a single request
    #[command(name = "run")]
    Run {
        #[command(flatten)]
        command: RunCommand,
    },

    /// Inspect checkpoint snapshots
    #[command(name = "checkpoint")]
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Run { command }) => commands::run::handle_command(command, cli.config).await,
        Some(Commands::Checkpoint { command }) => {
            commands::checkpoint::handle_command(command, cli.config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
