// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Planning outline commands
//!
//! Commands: show, generate, from-repo, import, export

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use devspace_core::application::RepositoryOutlineRequest;
use devspace_core::domain::outline::MergeMode;

use super::parse_application_id;
use crate::bootstrap;

#[derive(Clone, Copy, ValueEnum)]
pub enum Mode {
    /// Discard the existing outline
    Replace,
    /// Append to the existing outline with fresh ids
    Extend,
}

impl From<Mode> for MergeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Replace => MergeMode::Replace,
            Mode::Extend => MergeMode::Extend,
        }
    }
}

#[derive(Subcommand)]
pub enum OutlineCommand {
    /// Print the numbered outline
    Show {
        /// Application ID
        app_id: String,
    },

    /// Generate outline nodes from a description
    Generate {
        /// Application ID
        app_id: String,

        /// What the application should do
        prompt: String,

        #[arg(long, value_enum, default_value = "extend")]
        mode: Mode,
    },

    /// Generate an outline from the application's repository sources
    FromRepo {
        /// Application ID
        app_id: String,

        /// Path substring selecting the seed files
        #[arg(long, default_value = "src/app")]
        pattern: String,

        /// Only follow imports whose path contains this substring
        #[arg(long, default_value = "")]
        dependency_pattern: String,

        /// Import hops followed from the seed files
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
    },

    /// Import nodes from a JSON file
    Import {
        /// Application ID
        app_id: String,

        /// JSON file containing a node array
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_enum, default_value = "replace")]
        mode: Mode,
    },

    /// Export nodes as JSON
    Export {
        /// Application ID
        app_id: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn handle_command(command: OutlineCommand, config_path: Option<PathBuf>) -> Result<()> {
    let orchestrator = bootstrap::build_orchestrator(config_path).await?;
    let documents = orchestrator.documents();

    match command {
        OutlineCommand::Show { app_id } => {
            let outline = documents.numbered_outline(parse_application_id(&app_id)?).await?;
            if outline.is_empty() {
                println!("{}", "(empty outline)".dimmed());
            } else {
                println!("{}", outline);
            }
        }
        OutlineCommand::Generate { app_id, prompt, mode } => {
            let app_id = parse_application_id(&app_id)?;
            let document = documents.generate_outline(app_id, &prompt, mode.into()).await?;
            println!(
                "{}",
                format!("✓ Outline now has {} nodes", document.nodes.len()).green()
            );
            println!("{}", documents.numbered_outline(app_id).await?);
        }
        OutlineCommand::FromRepo {
            app_id,
            pattern,
            dependency_pattern,
            max_depth,
        } => {
            let request = RepositoryOutlineRequest {
                pattern,
                dependency_pattern,
                max_depth,
            };
            let app_id = parse_application_id(&app_id)?;
            let document = orchestrator.outline_from_repository(app_id, &request).await?;
            println!(
                "{}",
                format!("✓ Outline generated with {} nodes", document.nodes.len()).green()
            );
        }
        OutlineCommand::Import { app_id, file, mode } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let document = documents
                .import_json(parse_application_id(&app_id)?, &text, mode.into())
                .await?;
            println!(
                "{}",
                format!("✓ Imported; outline has {} nodes", document.nodes.len()).green()
            );
        }
        OutlineCommand::Export { app_id, output } => {
            let json = documents.export_json(parse_application_id(&app_id)?).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{}", format!("✓ Exported to {}", path.display()).green());
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}
