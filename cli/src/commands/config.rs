// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crate::config::{CheckpointBackend, GovernanceConfig, CHECKPOINT_DIR_ENV, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./aegis-governance.yaml)
        #[arg(short, long, default_value = "./aegis-governance.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GovernanceConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        for (index, path) in GovernanceConfig::discovery_paths().iter().enumerate() {
            let marker = if path.exists() { "✓".green() } else { "-".dimmed() };
            println!("  {}. {} {}", index + 2, path.display(), marker);
        }
        println!(
            "  ({}: {})",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    println!("{}", "Checkpoints:".bold());
    match config.spec.checkpoint.backend {
        CheckpointBackend::Local => {
            println!("  Backend: local");
            println!("  Path: {}", config.spec.checkpoint.resolved_path().display());
            if std::env::var(CHECKPOINT_DIR_ENV).is_ok() {
                println!("  {}", format!("(overridden by {})", CHECKPOINT_DIR_ENV).dimmed());
            }
        }
        CheckpointBackend::Memory => println!("  Backend: memory"),
    }
    println!();

    println!("{}", "Approval policy:".bold());
    println!(
        "  Auto-approve up to: {}",
        config.spec.approval.auto_approve_max_level
    );
    println!(
        "  Auto-reject from: {}",
        config
            .spec
            .approval
            .auto_reject_min_level
            .map_or("(never)".to_string(), |level| level.to_string())
    );
    println!();

    println!("{}", "Telemetry:".bold());
    println!("  Channel capacity: {}", config.spec.telemetry.channel_capacity);
    println!();

    println!("{}", "Health:".bold());
    println!("  Default status: {}", config.spec.health.default_status);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GovernanceConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/governance-with-examples.yaml")
    } else {
        include_str!("../../templates/governance-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_templates_are_valid() {
        for template in [
            include_str!("../../templates/governance-minimal.yaml"),
            include_str!("../../templates/governance-with-examples.yaml"),
        ] {
            let config = GovernanceConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }
}
