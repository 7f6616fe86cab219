// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Checkpoint inspection commands
//!
//! Commands: list, latest

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aegis_governance::domain::lifecycle::SessionId;

use crate::config::{CheckpointBackend, GovernanceConfig};
use crate::embedded::open_store;

#[derive(Subcommand)]
pub enum CheckpointCommand {
    /// List all checkpoints of a session
    List {
        #[arg(value_name = "SESSION_ID")]
        session_id: SessionId,
    },

    /// Show the most recent checkpoint of a session
    Latest {
        #[arg(value_name = "SESSION_ID")]
        session_id: SessionId,

        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(
    command: CheckpointCommand,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = GovernanceConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    if config.spec.checkpoint.backend == CheckpointBackend::Memory {
        eprintln!(
            "{}",
            "Checkpoint backend is 'memory'; snapshots do not outlive the process that took them."
                .yellow()
        );
    }
    let store = open_store(&config)?;

    match command {
        CheckpointCommand::List { session_id } => {
            let refs = store
                .list(session_id)
                .await
                .with_context(|| format!("Failed to list checkpoints for {}", session_id))?;

            if refs.is_empty() {
                println!("No checkpoints for session {}", session_id);
                return Ok(());
            }

            println!("{}", format!("Checkpoints for {}:", session_id).bold());
            for reference in refs {
                println!(
                    "  #{:<4} {}  {}",
                    reference.sequence_number,
                    reference.saved_at.to_rfc3339(),
                    reference.state_hash.dimmed()
                );
            }
        }
        CheckpointCommand::Latest { session_id, json } => {
            let Some(snapshot) = store
                .latest(session_id)
                .await
                .with_context(|| format!("Failed to read checkpoints for {}", session_id))?
            else {
                println!("No checkpoints for session {}", session_id);
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
                return Ok(());
            }

            let verified = snapshot.verify().is_ok();
            println!("{}", format!("Latest checkpoint for {}:", session_id).bold());
            println!("  Sequence: #{}", snapshot.sequence_number);
            println!("  Taken at: {}", snapshot.taken_at.to_rfc3339());
            println!("  State:    {}", snapshot.state_at_snapshot);
            println!("  Query:    {}", snapshot.context.user_query());
            println!(
                "  Hash:     {} {}",
                snapshot.state_hash,
                if verified { "✓".green() } else { "✗ mismatch".red() }
            );
        }
    }

    Ok(())
}
