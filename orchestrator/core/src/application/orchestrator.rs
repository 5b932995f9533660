// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application Orchestrator
//!
//! Sequences repository, machine and document creation for an application
//! and the inverse teardown, plus the machine lifecycle operations (suspend,
//! resume, redeploy, environment variables, certificate renewal).
//!
//! # Creation
//!
//! Each step is persisted before the next one starts, so an interrupted run
//! leaves a state that [`ApplicationOrchestrator::provision`] can resume or
//! [`ApplicationOrchestrator::teardown`] can remove:
//!
//! 1. application record
//! 2. source repository from the template, then its record
//! 3. instance, environment setup, then the machine record
//! 4. document and conversation (best effort)
//!
//! # Teardown
//!
//! Snapshots are read first, then every remote resource is deleted with
//! "not found" counted as success and other failures collected as warnings,
//! and only then are the local records removed.
//!
//! # Concurrency
//!
//! State-changing machine operations take a per-machine lock with
//! `try_lock`; a second request while one is in flight fails fast with
//! [`OrchestrationError::MachineBusy`].

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::application::compute_provisioner::ComputeProvisioner;
use crate::application::document_service::{DocumentService, RepositoryOutlineRequest};
use crate::application::environment::{EnvironmentConfigurator, EnvironmentOutcome};
use crate::application::repository_factory::Repositories;
use crate::application::source_provisioner::SourceRepositoryProvisioner;
use crate::domain::application::{Application, ApplicationId, GitHubAccountId, UserId};
use crate::domain::compute::InstanceSpec;
use crate::domain::config::OrchestratorConfig;
use crate::domain::document::Document;
use crate::domain::events::ProvisioningEvent;
use crate::domain::machine::{Machine, MachineError, MachineId, MachineState};
use crate::domain::remote_shell::{RemoteConnector, RemoteSession};
use crate::domain::source_repo::{GitHubCredentials, RepositoryAccess, SourceRepo};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Application not found: {0}")]
    ApplicationNotFound(ApplicationId),

    #[error("Application {0} has no repository")]
    NoRepository(ApplicationId),

    #[error("Application {0} has no machine")]
    NoMachine(ApplicationId),

    #[error("Machine {0} is busy with another operation")]
    MachineBusy(MachineId),

    #[error("Machine {0} has no address")]
    NoAddress(MachineId),

    #[error("Machine {0} has no domain")]
    NoDomain(MachineId),

    #[error("No GitHub credentials available for application {0}")]
    MissingCredentials(ApplicationId),
}

/// Fixed inputs for provisioning, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    pub template_owner: String,
    pub template_repo: String,
    /// Owner for generated repositories; empty means the account's own login.
    pub repository_owner: String,
    pub default_credentials: Option<GitHubCredentials>,
    pub zone: String,
    pub machine_type: String,
    pub source_image: String,
    pub disk_size_gb: u32,
    pub network_tags: Vec<String>,
    pub ssh_public_key: Option<String>,
}

impl ProvisioningSettings {
    pub fn from_config(config: &OrchestratorConfig, default_credentials: Option<GitHubCredentials>) -> Self {
        Self {
            template_owner: config.github.template_owner.clone(),
            template_repo: config.github.template_repo.clone(),
            repository_owner: config.github.repository_owner.clone(),
            default_credentials,
            zone: config.compute.zone.clone(),
            machine_type: config.compute.machine_type.clone(),
            source_image: config.compute.source_image.clone(),
            disk_size_gb: config.compute.disk_size_gb,
            network_tags: config.compute.network_tags.clone(),
            ssh_public_key: config.compute.ssh_public_key.clone(),
        }
    }

    fn instance_spec(&self, application: &Application) -> InstanceSpec {
        InstanceSpec {
            name: format!("devspace-{}", application.id.short()),
            zone: self.zone.clone(),
            machine_type: self.machine_type.clone(),
            source_image: self.source_image.clone(),
            disk_size_gb: self.disk_size_gb,
            network_tags: self.network_tags.clone(),
            ssh_public_key: self.ssh_public_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningReport {
    pub application: Application,
    pub repository: SourceRepo,
    pub machine: Machine,
    /// `false` when document creation failed; the application is usable
    /// without it.
    pub document_created: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    /// Cleanup failures that did not stop the teardown.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatus {
    pub application: Application,
    pub repository: Option<SourceRepo>,
    pub machine: Option<Machine>,
    pub has_document: bool,
}

pub struct ApplicationOrchestrator {
    repositories: Repositories,
    sources: Arc<SourceRepositoryProvisioner>,
    compute: Arc<ComputeProvisioner>,
    environment: Arc<EnvironmentConfigurator>,
    connector: Arc<dyn RemoteConnector>,
    documents: Arc<DocumentService>,
    event_bus: Arc<EventBus>,
    settings: ProvisioningSettings,
    machine_locks: DashMap<MachineId, Arc<Mutex<()>>>,
}

impl ApplicationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repositories: Repositories,
        sources: Arc<SourceRepositoryProvisioner>,
        compute: Arc<ComputeProvisioner>,
        environment: Arc<EnvironmentConfigurator>,
        connector: Arc<dyn RemoteConnector>,
        documents: Arc<DocumentService>,
        event_bus: Arc<EventBus>,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            repositories,
            sources,
            compute,
            environment,
            connector,
            documents,
            event_bus,
            settings,
            machine_locks: DashMap::new(),
        }
    }

    pub fn documents(&self) -> &Arc<DocumentService> {
        &self.documents
    }

    fn try_lock_machine(&self, id: MachineId) -> Result<OwnedMutexGuard<()>, OrchestrationError> {
        let lock = self
            .machine_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.try_lock_owned().map_err(|_| OrchestrationError::MachineBusy(id))
    }

    async fn application(&self, id: ApplicationId) -> Result<Application> {
        self.repositories
            .applications
            .find_by_id(id)
            .await?
            .ok_or_else(|| OrchestrationError::ApplicationNotFound(id).into())
    }

    async fn machine(&self, application_id: ApplicationId) -> Result<Machine> {
        self.repositories
            .machines
            .find_by_application(application_id)
            .await?
            .ok_or_else(|| OrchestrationError::NoMachine(application_id).into())
    }

    /// Take the machine's lock, then load its record. State checks made on
    /// the returned machine see every transition that finished before.
    async fn locked_machine(&self, application_id: ApplicationId) -> Result<(OwnedMutexGuard<()>, Machine)> {
        let id = self.machine(application_id).await?.id;
        let guard = self.try_lock_machine(id)?;
        let machine = self.machine(application_id).await?;
        Ok((guard, machine))
    }

    async fn locked_running_machine(&self, application_id: ApplicationId) -> Result<(OwnedMutexGuard<()>, Machine)> {
        let (guard, machine) = self.locked_machine(application_id).await?;
        if machine.state != MachineState::Running {
            return Err(MachineError::InvalidTransition {
                from: machine.state,
                to: MachineState::Running,
            }
            .into());
        }
        Ok((guard, machine))
    }

    async fn credentials_for(&self, application: &Application) -> Result<GitHubCredentials> {
        if let Some(account_id) = &application.github_account {
            let account = self
                .repositories
                .accounts
                .find_by_id(account_id)
                .await?
                .ok_or(OrchestrationError::MissingCredentials(application.id))?;
            return Ok(account.credentials);
        }
        self.settings
            .default_credentials
            .clone()
            .ok_or_else(|| OrchestrationError::MissingCredentials(application.id).into())
    }

    async fn access(&self, application_id: ApplicationId) -> Result<RepositoryAccess> {
        self.repositories
            .source_repos
            .find_access(application_id, self.settings.default_credentials.as_ref())
            .await?
            .ok_or_else(|| OrchestrationError::NoRepository(application_id).into())
    }

    async fn session_for(&self, machine: &Machine) -> Result<Arc<dyn RemoteSession>> {
        let ip = machine
            .ip_address
            .as_deref()
            .ok_or(OrchestrationError::NoAddress(machine.id))?;
        self.connector
            .connect(ip)
            .await
            .with_context(|| format!("Failed to open a session to {}", ip))
    }

    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        Ok(self.repositories.applications.list_all().await?)
    }

    pub async fn status(&self, application_id: ApplicationId) -> Result<ApplicationStatus> {
        let application = self.application(application_id).await?;
        let repository = self.repositories.source_repos.find_by_application(application_id).await?;
        let machine = self.repositories.machines.find_by_application(application_id).await?;
        let has_document = self.documents.find_document(application_id).await?.is_some();
        Ok(ApplicationStatus {
            application,
            repository,
            machine,
            has_document,
        })
    }

    /// Step 1: record a new application.
    pub async fn create_application(
        &self,
        name: &str,
        owner: Option<UserId>,
        github_account: Option<GitHubAccountId>,
    ) -> Result<Application> {
        let application = Application::new(name, owner, github_account);
        self.repositories
            .applications
            .insert(&application)
            .await
            .context("Failed to create application")?;

        info!(application_id = %application.id, "Application created: {}", application.name);
        self.event_bus.publish_provisioning_event(ProvisioningEvent::ApplicationCreated {
            application_id: application.id,
            name: application.name.clone(),
            created_at: Utc::now(),
        });
        Ok(application)
    }

    /// Create the application and provision everything for it.
    pub async fn create_and_provision(
        &self,
        name: &str,
        owner: Option<UserId>,
        github_account: Option<GitHubAccountId>,
    ) -> Result<ProvisioningReport> {
        let application = self.create_application(name, owner, github_account).await?;
        self.provision(application.id).await
    }

    /// Steps 2-4 for an existing application. Steps whose record already
    /// exists are skipped, so a failed run can be retried.
    pub async fn provision(&self, application_id: ApplicationId) -> Result<ProvisioningReport> {
        let application = self.application(application_id).await?;

        let result = async {
            let repository = self.provision_repository(&application).await?;
            let machine = self.provision_machine(&application).await?;
            Ok::<_, anyhow::Error>((repository, machine))
        }
        .await;

        let (repository, machine) = match result {
            Ok(provisioned) => provisioned,
            Err(e) => {
                metrics::counter!("devspace_provisioning_total", "outcome" => "failure").increment(1);
                error!(application_id = %application_id, "Provisioning failed: {:#}", e);
                return Err(e);
            }
        };

        let document_created = match self.documents.create_for_application(application_id).await {
            Ok(_) => true,
            Err(e) => {
                warn!(application_id = %application_id, "Document creation failed: {:#}", e);
                false
            }
        };

        metrics::counter!("devspace_provisioning_total", "outcome" => "success").increment(1);
        info!(application_id = %application_id, "Application provisioned");
        Ok(ProvisioningReport {
            application,
            repository,
            machine,
            document_created,
        })
    }

    /// Step 2: generate the repository from the template and record it.
    async fn provision_repository(&self, application: &Application) -> Result<SourceRepo> {
        if let Some(existing) = self
            .repositories
            .source_repos
            .find_by_application(application.id)
            .await?
        {
            info!(application_id = %application.id, "Repository already provisioned: {}", existing.full_name());
            return Ok(existing);
        }

        let credentials = self.credentials_for(application).await?;
        let owner = if self.settings.repository_owner.is_empty() {
            credentials.username.clone()
        } else {
            self.settings.repository_owner.clone()
        };

        let handle = self
            .sources
            .create_from_template(
                &self.settings.template_owner,
                &self.settings.template_repo,
                &owner,
                &application.repository_name(),
                &credentials,
            )
            .await
            .map_err(|e| self.step_failed(application.id, "repository", e))?;

        let repository = SourceRepo::from_handle(application.id, &handle, application.github_account.clone());
        self.repositories
            .source_repos
            .insert(&repository)
            .await
            .context("Failed to record repository")?;

        info!(application_id = %application.id, "Repository provisioned: {}", repository.full_name());
        self.event_bus.publish_provisioning_event(ProvisioningEvent::RepositoryProvisioned {
            application_id: application.id,
            full_name: repository.full_name(),
            provisioned_at: Utc::now(),
        });
        Ok(repository)
    }

    /// Step 3: create the instance, configure it and record the machine. The
    /// instance, backend project and DNS record are deleted again when any
    /// part of this step fails.
    async fn provision_machine(&self, application: &Application) -> Result<Machine> {
        if let Some(existing) = self.repositories.machines.find_by_application(application.id).await? {
            info!(application_id = %application.id, "Machine already provisioned: {}", existing.instance_name);
            return Ok(existing);
        }

        let access = self.access(application.id).await?;
        let spec = self.settings.instance_spec(application);

        let ip = self
            .compute
            .provision_instance(&spec)
            .await
            .map_err(|e| self.step_failed(application.id, "instance", e))?;

        let mut outcome = EnvironmentOutcome::default();
        let configured = async {
            let session = self.connector.connect(&ip).await?;
            self.environment
                .configure(session.as_ref(), &access, &ip, &mut outcome)
                .await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;

        if let Err(e) = configured {
            self.environment.release(&outcome).await;
            self.discard_instance(&spec).await;
            return Err(self.step_failed(application.id, "environment", e));
        }

        let mut machine = Machine::new(application.id, &spec.name, &spec.zone);
        machine.mark_provisioned(ip.clone())?;
        machine.domain = outcome.domain.clone();
        if let Some(project) = &outcome.backend {
            machine.backend_url = Some(project.url.clone());
            machine.backend_project_id = Some(project.id.clone());
        }

        if let Err(e) = self.repositories.machines.insert(&machine).await {
            self.environment.release(&outcome).await;
            self.discard_instance(&spec).await;
            return Err(self.step_failed(application.id, "machine-record", e));
        }

        info!(application_id = %application.id, machine_id = %machine.id, ip = %ip, "Machine provisioned");
        self.event_bus.publish_provisioning_event(ProvisioningEvent::MachineProvisioned {
            application_id: application.id,
            machine_id: machine.id,
            ip_address: ip,
            domain: machine.domain.clone(),
            provisioned_at: Utc::now(),
        });
        Ok(machine)
    }

    async fn discard_instance(&self, spec: &InstanceSpec) {
        if let Err(e) = self.compute.delete_instance(&spec.zone, &spec.name).await {
            warn!("Failed to remove instance {} after a failed setup: {:#}", spec.name, e);
        }
    }

    fn step_failed(&self, application_id: ApplicationId, step: &str, error: impl Into<anyhow::Error>) -> anyhow::Error {
        let error = error.into();
        self.event_bus.publish_provisioning_event(ProvisioningEvent::ProvisioningFailed {
            application_id,
            step: step.to_string(),
            reason: format!("{:#}", error),
            failed_at: Utc::now(),
        });
        error.context(format!("Provisioning step '{}' failed", step))
    }

    /// Remove every remote resource and local record of an application.
    pub async fn teardown(&self, application_id: ApplicationId) -> Result<TeardownReport> {
        let application = self.application(application_id).await?;
        let mut report = TeardownReport::default();

        // Snapshots first; remote cleanup needs them after local deletes start
        let repository = self.repositories.source_repos.find_by_application(application_id).await?;
        let access = match self
            .repositories
            .source_repos
            .find_access(application_id, self.settings.default_credentials.as_ref())
            .await
        {
            Ok(access) => access,
            Err(e) => {
                report.warn(format!("Repository credentials unavailable: {}", e));
                None
            }
        };
        let machine = self.repositories.machines.find_by_application(application_id).await?;
        let _guard = match &machine {
            Some(machine) => Some(self.try_lock_machine(machine.id)?),
            None => None,
        };

        info!(application_id = %application_id, "Tearing down application {}", application.name);

        if let Some(access) = &access {
            let repo = &access.repository;
            if let Err(e) = self.sources.delete(&repo.owner, &repo.name, &access.credentials).await {
                report.warn(format!("Repository {} not deleted: {}", repo.full_name(), e));
            }
        } else if let Some(repo) = &repository {
            report.warn(format!("Repository {} not deleted: no credentials", repo.full_name()));
        }

        if let Some(machine) = &machine {
            if let Err(e) = self.compute.delete_instance(&machine.zone, &machine.instance_name).await {
                report.warn(format!("Instance {} not deleted: {:#}", machine.instance_name, e));
            }
            if let Some(domain) = &machine.domain {
                if let Err(e) = self.environment.remove_dns_record(domain).await {
                    report.warn(format!("DNS record {} not deleted: {}", domain, e));
                }
            }
            if let Some(project_id) = &machine.backend_project_id {
                if let Err(e) = self.environment.delete_backend_project(project_id).await {
                    report.warn(format!("Backend project {} not deleted: {}", project_id, e));
                }
            }
        }

        if let Some(repo) = &repository {
            if let Err(e) = self.repositories.source_files.delete_by_repository(repo.id).await {
                report.warn(format!("Cached files not deleted: {}", e));
            }
            if let Err(e) = self.repositories.source_repos.delete(repo.id).await {
                report.warn(format!("Repository record not deleted: {}", e));
            }
        }
        if let Some(machine) = &machine {
            if let Err(e) = self.repositories.machines.delete(machine.id).await {
                report.warn(format!("Machine record not deleted: {}", e));
            }
        }
        if let Err(e) = self.documents.delete_for_application(application_id).await {
            report.warn(format!("Document not deleted: {:#}", e));
        }
        self.repositories
            .applications
            .delete(application_id)
            .await
            .context("Failed to delete application record")?;

        if let Some(machine) = &machine {
            self.machine_locks.remove(&machine.id);
        }

        metrics::counter!("devspace_teardown_total").increment(1);
        info!(
            application_id = %application_id,
            warnings = report.warnings.len(),
            "Application torn down"
        );
        self.event_bus.publish_provisioning_event(ProvisioningEvent::ApplicationTornDown {
            application_id,
            warnings: report.warnings.clone(),
            torn_down_at: Utc::now(),
        });
        Ok(report)
    }

    /// Stop the dev server and suspend the instance.
    pub async fn suspend(&self, application_id: ApplicationId) -> Result<Machine> {
        let (_guard, machine) = self.locked_machine(application_id).await?;
        machine.check_request(MachineState::Suspended)?;

        match self.session_for(&machine).await {
            Ok(session) => self.environment.stop_dev_server(session.as_ref()).await,
            Err(e) => warn!(machine_id = %machine.id, "Dev server not stopped: {:#}", e),
        }

        let updated = self.compute.suspend(&machine).await?;
        self.repositories.machines.save(&updated).await?;

        metrics::counter!("devspace_machine_transitions_total", "transition" => "suspend").increment(1);
        self.event_bus.publish_provisioning_event(ProvisioningEvent::MachineSuspended {
            application_id,
            machine_id: updated.id,
            suspended_at: Utc::now(),
        });
        Ok(updated)
    }

    /// Resume the instance, repoint the domain if the address changed and
    /// restart the dev server.
    pub async fn resume(&self, application_id: ApplicationId) -> Result<Machine> {
        let (_guard, machine) = self.locked_machine(application_id).await?;
        machine.check_request(MachineState::Running)?;

        let updated = self.compute.resume(&machine).await?;
        self.repositories.machines.save(&updated).await?;

        if updated.ip_address != machine.ip_address {
            if let (Some(domain), Some(ip)) = (&updated.domain, &updated.ip_address) {
                self.environment.point_domain(domain, ip).await?;
            }
        }

        let session = self.session_for(&updated).await?;
        self.environment.restart_dev_server(session.as_ref()).await?;

        metrics::counter!("devspace_machine_transitions_total", "transition" => "resume").increment(1);
        self.event_bus.publish_provisioning_event(ProvisioningEvent::MachineResumed {
            application_id,
            machine_id: updated.id,
            ip_address: updated.ip_address.clone(),
            resumed_at: Utc::now(),
        });
        Ok(updated)
    }

    /// Pull, reinstall and restart on a running machine.
    pub async fn redeploy(&self, application_id: ApplicationId) -> Result<()> {
        let (_guard, machine) = self.locked_running_machine(application_id).await?;

        let session = self.session_for(&machine).await?;
        self.environment.redeploy(session.as_ref()).await?;

        info!(application_id = %application_id, "Redeployed");
        self.event_bus.publish_provisioning_event(ProvisioningEvent::MachineRedeployed {
            application_id,
            machine_id: machine.id,
            redeployed_at: Utc::now(),
        });
        Ok(())
    }

    /// Upsert an environment variable and restart the dev server.
    pub async fn set_env_var(&self, application_id: ApplicationId, key: &str, value: &str) -> Result<()> {
        let (_guard, machine) = self.locked_running_machine(application_id).await?;

        let session = self.session_for(&machine).await?;
        self.environment.write_env_var(session.as_ref(), key, value).await?;
        self.environment.restart_dev_server(session.as_ref()).await?;
        info!(application_id = %application_id, key, "Environment variable set");
        Ok(())
    }

    /// Extend the application's outline from its repository's source files.
    pub async fn outline_from_repository(
        &self,
        application_id: ApplicationId,
        request: &RepositoryOutlineRequest,
    ) -> Result<Document> {
        let access = self.access(application_id).await?;
        self.documents
            .generate_from_repository(application_id, &access, request)
            .await
    }

    pub async fn renew_certificate(&self, application_id: ApplicationId) -> Result<()> {
        let (_guard, machine) = self.locked_running_machine(application_id).await?;
        let domain = machine
            .domain
            .clone()
            .ok_or(OrchestrationError::NoDomain(machine.id))?;

        let session = self.session_for(&machine).await?;
        self.environment.renew_certificate(session.as_ref(), &domain).await?;
        Ok(())
    }
}

impl TeardownReport {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}
