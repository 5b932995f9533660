// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service wiring
//!
//! Builds the orchestrator from a configuration manifest: provider adapters,
//! repositories (PostgreSQL when `database` is configured) and the
//! application services on top of them.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use devspace_core::application::{
    create_repositories, ApplicationOrchestrator, ComputeProvisioner, DocumentService,
    EnvironmentConfigurator, OutlineGenerator, ProvisioningSettings, Repositories,
    SourceRepositoryProvisioner,
};
use devspace_core::domain::backend_project::BackendProjectProvider;
use devspace_core::domain::config::{resolve_env_value, OrchestratorConfig, OrchestratorConfigManifest};
use devspace_core::domain::repository::{PostgresConfig, StorageBackend};
use devspace_core::domain::source_file::ImportAlias;
use devspace_core::domain::source_repo::GitHubCredentials;
use devspace_core::infrastructure::backend_project::HttpBackendProjectAdapter;
use devspace_core::infrastructure::db::Database;
use devspace_core::infrastructure::event_bus::EventBus;
use devspace_core::infrastructure::gcp::{
    self, CloudDnsAdapter, GceComputeAdapter, ServiceAccountTokenSource, StaticTokenSource, TokenSource,
};
use devspace_core::infrastructure::github::GitHubAdapter;
use devspace_core::infrastructure::llm::{AliasedProvider, ProviderRegistry};
use devspace_core::infrastructure::ssh::{SshConnector, SshOptions};

/// Pre-issued Google Cloud access token, used instead of service-account
/// credentials when set.
pub const ACCESS_TOKEN_ENV: &str = "DEVSPACE_GCP_ACCESS_TOKEN";

/// Load, override and validate the configuration manifest.
pub fn load_config(config_path: Option<PathBuf>) -> Result<OrchestratorConfigManifest> {
    let manifest = OrchestratorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    manifest.validate().context("Configuration validation failed")?;
    Ok(manifest)
}

/// Build the orchestrator for the given configuration file.
pub async fn build_orchestrator(config_path: Option<PathBuf>) -> Result<Arc<ApplicationOrchestrator>> {
    let manifest = load_config(config_path)?;
    info!("Configuration loaded: {}", manifest.metadata.name);
    wire(&manifest.spec).await
}

/// Construct every adapter and service from `config`.
pub async fn wire(config: &OrchestratorConfig) -> Result<Arc<ApplicationOrchestrator>> {
    let repositories = repositories(config).await?;
    let event_bus = Arc::new(EventBus::with_default_capacity());

    let tokens = token_source(config)?;
    let project_id = config.compute.project_id.clone();
    let dns_project = config.dns.project_id.clone().unwrap_or_else(|| project_id.clone());

    let github = Arc::new(GitHubAdapter::new(config.github.api_url.clone()));
    let sources = Arc::new(
        SourceRepositoryProvisioner::new(github)
            .with_batching(
                config.source.batch_size,
                Duration::from_millis(config.source.batch_delay_ms),
            )
            .with_alias(ImportAlias {
                prefix: config.source.import_alias_prefix.clone(),
                replacement: config.source.import_alias_replacement.clone(),
            }),
    );

    let compute = Arc::new(ComputeProvisioner::new(
        Arc::new(GceComputeAdapter::new(
            config.compute.api_url.clone(),
            project_id,
            tokens.clone(),
        )),
        Duration::from_secs(config.compute.poll_interval_secs.max(1)),
        Duration::from_secs(config.compute.operation_timeout_secs),
    ));

    let dns = Arc::new(CloudDnsAdapter::new(
        config.dns.api_url.clone(),
        dns_project,
        config.dns.managed_zone.clone(),
        tokens,
    ));

    let backend = match &config.backend_project {
        Some(backend) => {
            let api_key = match &backend.api_key {
                Some(key) => resolve_env_value(key).context("Failed to resolve backend_project.api_key")?,
                None => String::new(),
            };
            Some(Arc::new(HttpBackendProjectAdapter::new(backend.endpoint.clone(), api_key))
                as Arc<dyn BackendProjectProvider>)
        }
        None => {
            info!("No backend_project configured; environments get no backend project");
            None
        }
    };

    let environment = Arc::new(EnvironmentConfigurator::new(
        dns,
        backend,
        config.environment.clone(),
        config.dns.base_domain.clone(),
        config.dns.ttl,
    ));

    let connector = Arc::new(SshConnector::new(SshOptions {
        user: config.compute.ssh_user.clone(),
        identity_file: config.compute.ssh_private_key_path.as_ref().map(PathBuf::from),
        command_timeout: Duration::from_secs(config.environment.command_timeout_secs),
        ..SshOptions::default()
    }));

    let registry = Arc::new(ProviderRegistry::from_config(config).context("Failed to initialize LLM providers")?);
    let generator = Arc::new(OutlineGenerator::new(Arc::new(AliasedProvider::new(
        registry,
        config.llm_selection.generation_alias.clone(),
    ))));

    let documents = Arc::new(
        DocumentService::new(&repositories, generator, event_bus.clone()).with_source_provisioner(sources.clone()),
    );

    let settings = ProvisioningSettings::from_config(config, default_credentials(config)?);

    Ok(Arc::new(ApplicationOrchestrator::new(
        repositories,
        sources,
        compute,
        environment,
        connector,
        documents,
        event_bus,
        settings,
    )))
}

async fn repositories(config: &OrchestratorConfig) -> Result<Repositories> {
    let Some(database) = &config.database else {
        warn!("No database configured - state is kept in memory and lost on exit");
        return create_repositories(&StorageBackend::InMemory, None);
    };

    let url = resolve_env_value(&database.url).context("Failed to resolve database.url")?;
    let db = Database::new(&url, database.max_connections).await?;
    db.run_migrations().await?;
    info!("Connected to PostgreSQL");

    let backend = StorageBackend::PostgreSQL(PostgresConfig {
        connection_string: url,
        max_connections: database.max_connections,
    });
    create_repositories(&backend, Some(db.get_pool().clone()))
}

fn token_source(config: &OrchestratorConfig) -> Result<Arc<dyn TokenSource>> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        info!("Using access token from {}", ACCESS_TOKEN_ENV);
        return Ok(Arc::new(StaticTokenSource(token)));
    }

    let credentials = gcp::load_credentials(&config.compute).context("Failed to load compute credentials")?;
    let source = ServiceAccountTokenSource::new(&credentials).context("Invalid service-account credentials")?;
    Ok(Arc::new(source))
}

fn default_credentials(config: &OrchestratorConfig) -> Result<Option<GitHubCredentials>> {
    let Some(token) = &config.github.token else {
        return Ok(None);
    };
    let token = resolve_env_value(token).context("Failed to resolve github.token")?;
    Ok(Some(GitHubCredentials {
        username: config.github.username.clone(),
        token,
    }))
}
