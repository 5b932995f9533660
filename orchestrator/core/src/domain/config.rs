// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - Source control (template repository, default credentials)
// - Compute, DNS and the optional backend-project service
// - Remote environment layout and timeouts
// - LLM providers and alias selection
// - Persistence and HTTP API binding
//
// Secrets may be written as "env:VAR_NAME" and are resolved at wiring time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "devspace.dev/v1";
pub const KIND: &str = "OrchestratorConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigManifest {
    /// API version (must be "devspace.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "OrchestratorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub compute: ComputeConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub source: SourceConfig,

    /// Hosted backend project service; skipped when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_project: Option<BackendProjectConfig>,

    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    #[serde(default)]
    pub llm_selection: LLMSelection,

    /// PostgreSQL persistence; in-memory repositories when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_url: String,

    /// Owner of the template repository
    #[serde(default)]
    pub template_owner: String,

    /// Template repository name
    #[serde(default)]
    pub template_repo: String,

    /// Account or organisation that owns generated repositories
    #[serde(default)]
    pub repository_owner: String,

    /// Default credentials used when an application has no linked account
    #[serde(default)]
    pub username: String,

    /// Supports "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_true")]
    pub private_repositories: bool,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api(),
            template_owner: String::new(),
            template_repo: String::new(),
            repository_owner: String::new(),
            username: String::new(),
            token: None,
            private_repositories: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    #[serde(default = "default_compute_api")]
    pub api_url: String,

    #[serde(default)]
    pub project_id: String,

    #[serde(default = "default_zone")]
    pub zone: String,

    #[serde(default = "default_machine_type")]
    pub machine_type: String,

    #[serde(default = "default_source_image")]
    pub source_image: String,

    #[serde(default = "default_disk_size")]
    pub disk_size_gb: u32,

    #[serde(default = "default_network_tags")]
    pub network_tags: Vec<String>,

    /// Path to a service-account JSON key file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<String>,

    /// Inline service-account email (alternative to credentials_file)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,

    /// Inline PEM private key, supports "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_private_key_path: Option<String>,

    /// Public key installed on new instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<String>,

    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            api_url: default_compute_api(),
            project_id: String::new(),
            zone: default_zone(),
            machine_type: default_machine_type(),
            source_image: default_source_image(),
            disk_size_gb: default_disk_size(),
            network_tags: default_network_tags(),
            credentials_file: None,
            client_email: None,
            private_key: None,
            ssh_user: default_ssh_user(),
            ssh_private_key_path: None,
            ssh_public_key: None,
            operation_timeout_secs: default_operation_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_api")]
    pub api_url: String,

    /// Defaults to compute.project_id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default)]
    pub managed_zone: String,

    /// Machines are reachable at <subdomain>.<base_domain>
    #[serde(default)]
    pub base_domain: String,

    #[serde(default = "default_dns_ttl")]
    pub ttl: u32,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            api_url: default_dns_api(),
            project_id: None,
            managed_zone: String::new(),
            base_domain: String::new(),
            ttl: default_dns_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    #[serde(default = "default_dev_port")]
    pub dev_port: u16,

    /// Process-manager name of the development server
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// Environment file inside the workspace
    #[serde(default = "default_env_file")]
    pub env_file: String,

    #[serde(default = "default_dev_script_name")]
    pub dev_script_name: String,

    #[serde(default = "default_dev_script_command")]
    pub dev_script_command: String,

    #[serde(default = "default_install_command")]
    pub install_command: String,

    /// Contact address for certificate registration
    #[serde(default)]
    pub certificate_email: String,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_health_interval")]
    pub health_poll_interval_secs: u64,

    #[serde(default = "default_health_attempts")]
    pub health_poll_attempts: u32,

    /// Framework configuration file written once if missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_config: Option<FrameworkConfigFile>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            dev_port: default_dev_port(),
            process_name: default_process_name(),
            env_file: default_env_file(),
            dev_script_name: default_dev_script_name(),
            dev_script_command: default_dev_script_command(),
            install_command: default_install_command(),
            certificate_email: String::new(),
            command_timeout_secs: default_command_timeout(),
            health_poll_interval_secs: default_health_interval(),
            health_poll_attempts: default_health_attempts(),
            framework_config: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfigFile {
    /// Path relative to the workspace
    pub path: String,
    pub contents: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Files fetched concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,

    /// Import hops followed from the seed files
    #[serde(default = "default_dependency_depth")]
    pub max_dependency_depth: usize,

    #[serde(default = "default_alias_prefix")]
    pub import_alias_prefix: String,

    #[serde(default = "default_alias_replacement")]
    pub import_alias_replacement: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            max_dependency_depth: default_dependency_depth(),
            import_alias_prefix: default_alias_prefix(),
            import_alias_replacement: default_alias_replacement(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendProjectConfig {
    pub endpoint: String,

    /// Supports "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local", "openai")
    pub name: String,

    /// "ollama", "openai" or "openai-compatible"
    #[serde(rename = "type")]
    pub provider_type: String,

    pub endpoint: String,

    /// Supports "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alias used by the orchestrator (e.g., "default", "outline")
    pub alias: String,

    /// Model identifier for the provider API
    pub model: String,

    #[serde(default)]
    pub context_window: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMSelection {
    /// Alias used for outline generation
    #[serde(default = "default_generation_alias")]
    pub generation_alias: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for LLMSelection {
    fn default() -> Self {
        Self {
            generation_alias: default_generation_alias(),
            fallback_provider: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Supports "env:VAR_NAME"
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_compute_api() -> String {
    "https://compute.googleapis.com/compute/v1".to_string()
}

fn default_dns_api() -> String {
    "https://dns.googleapis.com/dns/v1".to_string()
}

fn default_zone() -> String {
    "us-central1-a".to_string()
}

fn default_machine_type() -> String {
    "e2-standard-2".to_string()
}

fn default_source_image() -> String {
    "projects/debian-cloud/global/images/family/debian-12".to_string()
}

fn default_disk_size() -> u32 {
    30
}

fn default_network_tags() -> Vec<String> {
    vec!["http-server".to_string(), "https-server".to_string()]
}

fn default_ssh_user() -> String {
    "devspace".to_string()
}

fn default_operation_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    5
}

fn default_dns_ttl() -> u32 {
    300
}

fn default_workspace_dir() -> String {
    "/home/devspace/app".to_string()
}

fn default_dev_port() -> u16 {
    3000
}

fn default_process_name() -> String {
    "devspace-dev".to_string()
}

fn default_env_file() -> String {
    ".env.local".to_string()
}

fn default_dev_script_name() -> String {
    "dev".to_string()
}

fn default_dev_script_command() -> String {
    "next dev -H 0.0.0.0 -p 3000".to_string()
}

fn default_install_command() -> String {
    "npm install".to_string()
}

fn default_command_timeout() -> u64 {
    600
}

fn default_health_interval() -> u64 {
    2
}

fn default_health_attempts() -> u32 {
    30
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay() -> u64 {
    1000
}

fn default_dependency_depth() -> usize {
    10
}

fn default_alias_prefix() -> String {
    "@/".to_string()
}

fn default_alias_replacement() -> String {
    "src/".to_string()
}

fn default_generation_alias() -> String {
    "default".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_max_connections() -> u32 {
    5
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8088
}

/// Resolve an "env:VAR_NAME" reference; other values pass through.
pub fn resolve_env_value(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable not found: {}", var_name)),
        None => Ok(value.to_string()),
    }
}

impl Default for OrchestratorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "devspace-orchestrator".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: OrchestratorConfig::default(),
        }
    }
}

impl OrchestratorConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. DEVSPACE_CONFIG_PATH environment variable
    /// 2. ./devspace-config.yaml (working directory)
    /// 3. ~/.devspace/config.yaml (user home)
    /// 4. /etc/devspace/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("DEVSPACE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./devspace-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".devspace").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/devspace/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!(path = ?path, "Loading configuration from explicit path");
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!(path = ?config_path, "Loading configuration from discovered path");
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Environment variable overrides for container deployments
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DEVSPACE_DATABASE_URL") {
            tracing::info!("Environment override: DEVSPACE_DATABASE_URL");
            match self.spec.database.as_mut() {
                Some(database) => database.url = url,
                None => {
                    self.spec.database = Some(DatabaseConfig {
                        url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Ok(val) = std::env::var("DEVSPACE_API_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!(port, "Environment override: DEVSPACE_API_PORT");
                    self.spec.api.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for DEVSPACE_API_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let github = &self.spec.github;
        if github.template_repo.is_empty() != github.template_owner.is_empty() {
            anyhow::bail!("github.template_owner and github.template_repo must be set together");
        }

        if self.spec.compute.operation_timeout_secs == 0 {
            anyhow::bail!("compute.operation_timeout_secs must be greater than zero");
        }

        if self.spec.environment.command_timeout_secs == 0 {
            anyhow::bail!("environment.command_timeout_secs must be greater than zero");
        }

        if self.spec.source.batch_size == 0 {
            anyhow::bail!("source.batch_size must be greater than zero");
        }

        for provider in &self.spec.llm_providers {
            if provider.name.is_empty() {
                anyhow::bail!("LLM provider name cannot be empty");
            }

            if provider.endpoint.is_empty() {
                anyhow::bail!("LLM provider endpoint cannot be empty for: {}", provider.name);
            }

            if provider.models.is_empty() {
                anyhow::bail!("LLM provider must have at least one model: {}", provider.name);
            }

            for model in &provider.models {
                if model.alias.is_empty() {
                    anyhow::bail!("Model alias cannot be empty in provider: {}", provider.name);
                }

                if model.model.is_empty() {
                    anyhow::bail!("Model identifier cannot be empty for alias: {}", model.alias);
                }
            }
        }

        if let Some(fallback_provider) = &self.spec.llm_selection.fallback_provider {
            if !self.spec.llm_providers.iter().any(|p| &p.name == fallback_provider) {
                anyhow::bail!("Fallback provider '{}' not found in llm_providers", fallback_provider);
            }
        }

        Ok(())
    }
}
