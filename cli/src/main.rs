// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Devspace Orchestrator CLI
//!
//! The `devspace` binary provisions and manages per-user cloud development
//! environments and their planning outlines.
//!
//! ## Commands
//!
//! - `devspace serve` - Run the HTTP API
//! - `devspace app create|provision|status|list|teardown|...` - Application lifecycle
//! - `devspace outline show|generate|import|export` - Planning outlines
//! - `devspace config show|validate|generate` - Configuration management
//!
//! Commands other than `config` build the services in-process from the
//! configuration file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use devspace_orchestrator::commands::{self, AppCommand, ConfigCommand, OutlineCommand};

/// Devspace orchestrator - cloud development environments on demand
#[derive(Parser)]
#[command(name = "devspace")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "DEVSPACE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DEVSPACE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    #[command(name = "serve")]
    Serve {
        #[command(flatten)]
        command: commands::ServeCommand,
    },

    /// Application lifecycle
    #[command(name = "app")]
    App {
        #[command(subcommand)]
        command: AppCommand,
    },

    /// Planning outline operations
    #[command(name = "outline")]
    Outline {
        #[command(subcommand)]
        command: OutlineCommand,
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
        Some(Commands::Serve { command }) => commands::serve::execute(command, cli.config).await,
        Some(Commands::App { command }) => commands::app::handle_command(command, cli.config).await,
        Some(Commands::Outline { command }) => {
            commands::outline::handle_command(command, cli.config).await
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
        .compact()
        .init();

    Ok(())
}
