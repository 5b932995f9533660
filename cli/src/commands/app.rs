// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application lifecycle commands
//!
//! Commands: create, provision, status, list, teardown, suspend, resume,
//! redeploy, set-env, renew-cert

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use devspace_core::application::{ApplicationStatus, ProvisioningReport};
use devspace_core::domain::application::{GitHubAccountId, UserId};
use devspace_core::domain::machine::{Machine, MachineState};

use super::parse_application_id;
use crate::bootstrap;

#[derive(Subcommand)]
pub enum AppCommand {
    /// Create an application, optionally provisioning it right away
    Create {
        /// Application name
        name: String,

        /// Owning user; omit for a template application
        #[arg(long)]
        owner: Option<String>,

        /// Linked GitHub account used for the repository
        #[arg(long)]
        github_account: Option<String>,

        /// Provision repository, machine and document after creating
        #[arg(long)]
        provision: bool,
    },

    /// Provision (or finish provisioning) an existing application
    Provision {
        /// Application ID
        app_id: String,
    },

    /// Show application status
    Status {
        /// Application ID
        app_id: String,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List applications
    List,

    /// Delete an application and every resource it owns
    Teardown {
        /// Application ID
        app_id: String,
    },

    /// Stop the application's machine
    Suspend {
        /// Application ID
        app_id: String,
    },

    /// Start a suspended machine
    Resume {
        /// Application ID
        app_id: String,
    },

    /// Pull the latest code and restart the development server
    Redeploy {
        /// Application ID
        app_id: String,
    },

    /// Set an environment variable on the machine
    SetEnv {
        /// Application ID
        app_id: String,

        /// Variable name
        key: String,

        /// Variable value
        value: String,
    },

    /// Renew the machine's TLS certificate
    RenewCert {
        /// Application ID
        app_id: String,
    },
}

pub async fn handle_command(command: AppCommand, config_path: Option<PathBuf>) -> Result<()> {
    let orchestrator = bootstrap::build_orchestrator(config_path).await?;

    match command {
        AppCommand::Create {
            name,
            owner,
            github_account,
            provision,
        } => {
            let owner = owner.map(UserId);
            let account = github_account.map(GitHubAccountId);
            if provision {
                let report = orchestrator.create_and_provision(&name, owner, account).await?;
                print_report(&report);
            } else {
                let application = orchestrator.create_application(&name, owner, account).await?;
                println!(
                    "{}",
                    format!("✓ Application created: {}", application.id).green()
                );
            }
        }
        AppCommand::Provision { app_id } => {
            let report = orchestrator.provision(parse_application_id(&app_id)?).await?;
            print_report(&report);
        }
        AppCommand::Status { app_id, json } => {
            let status = orchestrator.status(parse_application_id(&app_id)?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        AppCommand::List => {
            let applications = orchestrator.list_applications().await?;
            if applications.is_empty() {
                println!("{}", "No applications".dimmed());
            }
            for application in applications {
                println!(
                    "{}  {}  {}",
                    application.id,
                    application.name.bold(),
                    application.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
                );
            }
        }
        AppCommand::Teardown { app_id } => {
            let report = orchestrator.teardown(parse_application_id(&app_id)?).await?;
            println!("{}", "✓ Application torn down".green());
            for warning in &report.warnings {
                println!("  {} {}", "warning:".yellow(), warning);
            }
        }
        AppCommand::Suspend { app_id } => {
            let machine = orchestrator.suspend(parse_application_id(&app_id)?).await?;
            print_machine(&machine);
        }
        AppCommand::Resume { app_id } => {
            let machine = orchestrator.resume(parse_application_id(&app_id)?).await?;
            print_machine(&machine);
        }
        AppCommand::Redeploy { app_id } => {
            orchestrator.redeploy(parse_application_id(&app_id)?).await?;
            println!("{}", "✓ Redeployed".green());
        }
        AppCommand::SetEnv { app_id, key, value } => {
            orchestrator
                .set_env_var(parse_application_id(&app_id)?, &key, &value)
                .await?;
            println!("{}", format!("✓ {} set", key).green());
        }
        AppCommand::RenewCert { app_id } => {
            orchestrator.renew_certificate(parse_application_id(&app_id)?).await?;
            println!("{}", "✓ Certificate renewed".green());
        }
    }

    Ok(())
}

fn print_report(report: &ProvisioningReport) {
    println!(
        "{}",
        format!("✓ Application provisioned: {}", report.application.id).green()
    );
    println!("  Repository: {}", report.repository.html_url);
    print_machine(&report.machine);
    if !report.document_created {
        println!("  {} planning document was not created", "warning:".yellow());
    }
}

fn print_status(status: &ApplicationStatus) {
    println!("{}", status.application.name.bold());
    println!("  ID: {}", status.application.id);
    match &status.repository {
        Some(repository) => println!("  Repository: {}/{}", repository.owner, repository.name),
        None => println!("  Repository: {}", "(none)".dimmed()),
    }
    match &status.machine {
        Some(machine) => print_machine(machine),
        None => println!("  Machine: {}", "(none)".dimmed()),
    }
    println!("  Document: {}", if status.has_document { "yes" } else { "no" });
}

fn print_machine(machine: &Machine) {
    let state = match machine.state {
        MachineState::Running => machine.state.as_str().green(),
        MachineState::Suspended => machine.state.as_str().yellow(),
        _ => machine.state.as_str().normal(),
    };
    println!("  Machine: {} ({})", machine.instance_name, state);
    if let Some(ip) = &machine.ip_address {
        println!("    IP: {}", ip);
    }
    if let Some(domain) = &machine.domain {
        println!("    URL: https://{}", domain);
    }
}
