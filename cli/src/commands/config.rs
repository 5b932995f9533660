// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use devspace_core::domain::config::OrchestratorConfigManifest;

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
        /// Output path (default: ./devspace-config.yaml)
        #[arg(short, long, default_value = "./devspace-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let manifest = OrchestratorConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;
    let config = &manifest.spec;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. DEVSPACE_CONFIG_PATH: {}",
            std::env::var("DEVSPACE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./devspace-config.yaml");
        println!("  4. ~/.devspace/config.yaml");
        println!("  5. /etc/devspace/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", manifest.metadata.name);
    println!();

    println!("{}", "Source Control:".bold());
    if config.github.template_repo.is_empty() {
        println!("  Template: {}", "(none)".dimmed());
    } else {
        println!(
            "  Template: {}/{}",
            config.github.template_owner, config.github.template_repo
        );
    }
    println!("  Repository owner: {}", config.github.repository_owner);
    println!(
        "  Default token: {}",
        if config.github.token.is_some() { "configured" } else { "(none)" }
    );
    println!();

    println!("{}", "Compute:".bold());
    println!("  Project: {}", config.compute.project_id);
    println!("  Zone: {}", config.compute.zone);
    println!("  Machine type: {}", config.compute.machine_type);
    println!("  Image: {}", config.compute.source_image);
    println!();

    println!("{}", "DNS:".bold());
    println!("  Managed zone: {}", config.dns.managed_zone);
    println!("  Base domain: {}", config.dns.base_domain);
    println!("  TTL: {}s", config.dns.ttl);
    println!();

    println!("{}", "LLM Providers:".bold());
    for provider in &config.llm_providers {
        println!("  {} ({})", provider.name.bold(), provider.provider_type);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!("  Generation alias: {}", config.llm_selection.generation_alias);
    if let Some(fallback) = &config.llm_selection.fallback_provider {
        println!("  Fallback provider: {}", fallback);
    }
    println!();

    println!("{}", "Storage:".bold());
    match &config.database {
        Some(database) => println!("  PostgreSQL (max {} connections)", database.max_connections),
        None => println!("  In-memory"),
    }
    println!("  API: {}:{}", config.api.bind_address, config.api.port);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let manifest =
        OrchestratorConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    manifest.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    write_sample(output, with_examples)?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn write_sample(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(output, sample).with_context(|| format!("Failed to write config to {:?}", output))
}
