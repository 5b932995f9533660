// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provider mocks and a wired orchestrator for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;

use devspace_core::application::{
    ApplicationOrchestrator, ComputeProvisioner, DocumentService, EnvironmentConfigurator, OutlineGenerator,
    ProvisioningSettings, Repositories, SourceRepositoryProvisioner,
};
use devspace_core::domain::backend_project::{BackendProject, BackendProjectError, BackendProjectProvider};
use devspace_core::domain::compute::{
    ComputeError, ComputeProvider, InstanceInfo, InstanceSpec, OperationHandle, OperationStatus,
};
use devspace_core::domain::config::EnvironmentConfig;
use devspace_core::domain::dns::{DnsError, DnsProvider, DnsRecord};
use devspace_core::domain::llm::{FinishReason, GenerationRequest, GenerationResponse, LLMError, LLMProvider, TokenUsage};
use devspace_core::domain::outline::Node;
use devspace_core::domain::remote_shell::{CommandOutput, RemoteConnector, RemoteSession, ShellError};
use devspace_core::domain::source_repo::{
    ContentEntry, GitHubCredentials, RepositoryHandle, SourceControlError, SourceControlProvider, TemplateRequest,
};
use devspace_core::infrastructure::event_bus::EventBus;

pub fn node(id: &str, parent_id: &str, label: &str) -> Node {
    Node::new(id, parent_id, label)
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('\'').to_string()
}

/// Every command succeeds; file reads and writes go to a map and pm2 reports
/// the dev server online.
pub struct FakeHost {
    pub files: Mutex<HashMap<String, String>>,
    pub commands: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn with_package_json() -> Self {
        let mut files = HashMap::new();
        files.insert(
            "/home/devspace/app/package.json".to_string(),
            r#"{"name":"app","scripts":{"build":"next build"}}"#.to_string(),
        );
        Self {
            files: Mutex::new(files),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.commands.lock().iter().any(|c| c.contains(pattern))
    }
}

#[async_trait]
impl RemoteSession for FakeHost {
    fn host(&self) -> &str {
        "fake-host"
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        self.commands.lock().push(command.to_string());

        if let Some(path) = command.strip_prefix("test -f ") {
            let exists = self.files.lock().contains_key(&unquote(path));
            return Ok(CommandOutput {
                exit_code: if exists { 0 } else { 1 },
                stdout: String::new(),
                stderr: String::new(),
            });
        }
        if let Some(path) = command.strip_prefix("cat '") {
            let contents = self.files.lock().get(&unquote(path)).cloned().unwrap_or_default();
            return Ok(ok(&contents));
        }
        if let Some((payload, sink)) = command
            .strip_prefix("echo ")
            .and_then(|rest| rest.split_once(" | base64 -d | "))
        {
            let path = sink
                .trim_start_matches("sudo tee ")
                .trim_start_matches("cat > ")
                .trim_end_matches(" > /dev/null");
            let decoded = STANDARD.decode(payload.trim()).unwrap_or_default();
            self.files
                .lock()
                .insert(unquote(path), String::from_utf8_lossy(&decoded).to_string());
            return Ok(ok(""));
        }
        if command.contains("pm2 jlist") {
            return Ok(ok(r#"[{"name":"devspace-dev","pm2_env":{"status":"online"}}]"#));
        }
        Ok(ok(""))
    }
}

pub struct FakeConnector(pub Arc<FakeHost>);

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(&self, _host: &str) -> Result<Arc<dyn RemoteSession>, ShellError> {
        Ok(self.0.clone())
    }
}

/// GitHub stand-in. `deleted_remotely` simulates a repository removed by hand.
#[derive(Default)]
pub struct MockGitHub {
    pub repositories: Mutex<Vec<String>>,
    pub deleted_remotely: bool,
    pub directories: HashMap<String, Vec<ContentEntry>>,
    pub files: HashMap<String, String>,
}

#[async_trait]
impl SourceControlProvider for MockGitHub {
    async fn generate_from_template(
        &self,
        request: &TemplateRequest,
        _credentials: &GitHubCredentials,
    ) -> Result<RepositoryHandle, SourceControlError> {
        self.repositories
            .lock()
            .push(format!("{}/{}", request.owner, request.name));
        Ok(RepositoryHandle {
            owner: request.owner.clone(),
            name: request.name.clone(),
            clone_url: format!("https://github.com/{}/{}.git", request.owner, request.name),
            html_url: format!("https://github.com/{}/{}", request.owner, request.name),
        })
    }

    async fn delete_repository(
        &self,
        owner: &str,
        name: &str,
        _credentials: &GitHubCredentials,
    ) -> Result<(), SourceControlError> {
        let full_name = format!("{}/{}", owner, name);
        if self.deleted_remotely {
            return Err(SourceControlError::NotFound(full_name));
        }
        self.repositories.lock().retain(|r| *r != full_name);
        Ok(())
    }

    async fn list_directory(
        &self,
        _owner: &str,
        _name: &str,
        path: &str,
        _credentials: &GitHubCredentials,
    ) -> Result<Vec<ContentEntry>, SourceControlError> {
        self.directories
            .get(path)
            .cloned()
            .ok_or_else(|| SourceControlError::NotFound(path.to_string()))
    }

    async fn get_file_content(
        &self,
        _owner: &str,
        _name: &str,
        path: &str,
        _credentials: &GitHubCredentials,
    ) -> Result<String, SourceControlError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SourceControlError::NotFound(path.to_string()))
    }
}

/// Compute stand-in; `instances` holds the live instance names.
pub struct MockCompute {
    pub instances: Mutex<Vec<String>>,
    pub ip: String,
}

impl Default for MockCompute {
    fn default() -> Self {
        Self {
            instances: Mutex::new(Vec::new()),
            ip: "35.0.0.7".to_string(),
        }
    }
}

impl MockCompute {
    fn done(&self, name: &str) -> OperationHandle {
        OperationHandle {
            name: format!("op-{}", name),
            zone: "europe-west1-b".to_string(),
        }
    }
}

#[async_trait]
impl ComputeProvider for MockCompute {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<OperationHandle, ComputeError> {
        self.instances.lock().push(spec.name.clone());
        Ok(self.done(&spec.name))
    }

    async fn delete_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        let mut instances = self.instances.lock();
        if !instances.iter().any(|i| i == name) {
            return Err(ComputeError::NotFound(name.to_string()));
        }
        instances.retain(|i| i != name);
        Ok(self.done(name))
    }

    async fn suspend_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        Ok(self.done(name))
    }

    async fn resume_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        Ok(self.done(name))
    }

    async fn get_instance(&self, zone: &str, name: &str) -> Result<InstanceInfo, ComputeError> {
        Ok(InstanceInfo {
            name: name.to_string(),
            zone: zone.to_string(),
            status: "RUNNING".to_string(),
            external_ip: Some(self.ip.clone()),
        })
    }

    async fn poll_operation(&self, _operation: &OperationHandle) -> Result<OperationStatus, ComputeError> {
        Ok(OperationStatus::Done { error: None })
    }
}

#[derive(Default)]
pub struct MockDns {
    pub records: Mutex<HashMap<String, DnsRecord>>,
}

#[async_trait]
impl DnsProvider for MockDns {
    async fn create_record(&self, record: &DnsRecord) -> Result<(), DnsError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.name) {
            return Err(DnsError::AlreadyExists(record.name.clone()));
        }
        records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, name: &str, _record_type: &str) -> Result<(), DnsError> {
        self.records
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DnsError::NotFound(name.to_string()))
    }
}

#[derive(Default)]
pub struct MockBackend {
    pub live: Mutex<Vec<String>>,
}

#[async_trait]
impl BackendProjectProvider for MockBackend {
    async fn create_project(&self, name: &str) -> Result<BackendProject, BackendProjectError> {
        let id = format!("bp-{}", name);
        self.live.lock().push(id.clone());
        Ok(BackendProject {
            url: format!("https://{}.backend.test", id),
            id,
        })
    }

    async fn delete_project(&self, id: &str) -> Result<(), BackendProjectError> {
        self.live.lock().retain(|p| p != id);
        Ok(())
    }
}

/// Returns scripted texts in order.
#[derive(Default)]
pub struct ScriptedLlm {
    pub responses: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedLlm {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LLMError> {
        self.requests.lock().push(request.clone());
        let text = self
            .responses
            .lock()
            .pop_front()
            .ok_or_else(|| LLMError::Provider("script exhausted".to_string()))?;
        Ok(GenerationResponse {
            text,
            usage: TokenUsage::default(),
            provider: "scripted".to_string(),
            model: "scripted".to_string(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

pub struct World {
    pub orchestrator: Arc<ApplicationOrchestrator>,
    pub documents: Arc<DocumentService>,
    pub repositories: Repositories,
    pub github: Arc<MockGitHub>,
    pub compute: Arc<MockCompute>,
    pub dns: Arc<MockDns>,
    pub backend: Arc<MockBackend>,
    pub host: Arc<FakeHost>,
    pub llm: Arc<ScriptedLlm>,
    pub event_bus: Arc<EventBus>,
}

impl World {
    pub fn new() -> Self {
        Self::with(MockGitHub::default(), ScriptedLlm::default())
    }

    pub fn with(github: MockGitHub, llm: ScriptedLlm) -> Self {
        let repositories = Repositories::in_memory();
        let github = Arc::new(github);
        let compute = Arc::new(MockCompute::default());
        let dns = Arc::new(MockDns::default());
        let backend = Arc::new(MockBackend::default());
        let host = Arc::new(FakeHost::with_package_json());
        let llm = Arc::new(llm);
        let event_bus = Arc::new(EventBus::with_default_capacity());

        let sources = Arc::new(
            SourceRepositoryProvisioner::new(github.clone()).with_batching(2, Duration::from_millis(1)),
        );
        let backend_provider: Arc<dyn BackendProjectProvider> = backend.clone();
        let environment = EnvironmentConfigurator::new(
            dns.clone(),
            Some(backend_provider),
            EnvironmentConfig::default(),
            "apps.example.dev",
            60,
        )
        .with_health_poll(Duration::from_millis(1), 3);
        let documents = Arc::new(
            DocumentService::new(&repositories, Arc::new(OutlineGenerator::new(llm.clone())), event_bus.clone())
                .with_source_provisioner(sources.clone()),
        );
        let settings = ProvisioningSettings {
            template_owner: "devspace".to_string(),
            template_repo: "next-starter".to_string(),
            repository_owner: "devspace-apps".to_string(),
            default_credentials: Some(GitHubCredentials {
                username: "bot".to_string(),
                token: "ghp_test".to_string(),
            }),
            zone: "europe-west1-b".to_string(),
            machine_type: "e2-medium".to_string(),
            source_image: "projects/debian-cloud/global/images/family/debian-12".to_string(),
            disk_size_gb: 20,
            network_tags: vec!["http-server".to_string(), "https-server".to_string()],
            ssh_public_key: None,
        };

        let orchestrator = Arc::new(ApplicationOrchestrator::new(
            repositories.clone(),
            sources,
            Arc::new(ComputeProvisioner::new(
                compute.clone(),
                Duration::from_millis(1),
                Duration::from_secs(5),
            )),
            Arc::new(environment),
            Arc::new(FakeConnector(host.clone())),
            documents.clone(),
            event_bus.clone(),
            settings,
        ));

        Self {
            orchestrator,
            documents,
            repositories,
            github,
            compute,
            dns,
            backend,
            host,
            llm,
            event_bus,
        }
    }
}
