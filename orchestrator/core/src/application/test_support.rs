// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Hand-written provider mocks shared by the application-layer unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;

use crate::domain::backend_project::{BackendProject, BackendProjectError, BackendProjectProvider};
use crate::domain::compute::{
    ComputeError, ComputeProvider, InstanceInfo, InstanceSpec, OperationHandle, OperationStatus,
};
use crate::domain::dns::{DnsError, DnsProvider, DnsRecord};
use crate::domain::llm::{FinishReason, GenerationRequest, GenerationResponse, LLMError, LLMProvider, TokenUsage};
use crate::domain::remote_shell::{CommandOutput, RemoteConnector, RemoteSession, ShellError};
use crate::domain::source_repo::{
    ContentEntry, GitHubCredentials, RepositoryHandle, SourceControlError, SourceControlProvider,
    TemplateRequest,
};

pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('\'').to_string()
}

/// Remote session backed by an in-memory file map. Commands matching a
/// scripted pattern get the scripted output; the last scripted output for a
/// pattern repeats.
pub struct MockSession {
    host: String,
    pub files: Mutex<HashMap<String, String>>,
    pub commands: Mutex<Vec<String>>,
    scripted: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
}

impl MockSession {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            files: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            scripted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.files.lock().insert(path.to_string(), contents.to_string());
        self
    }

    pub fn respond(&self, pattern: &str, outputs: Vec<CommandOutput>) {
        self.scripted.lock().push((pattern.to_string(), outputs.into()));
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.commands.lock().iter().any(|c| c.contains(pattern))
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands.lock().iter().position(|c| c.contains(pattern))
    }

    fn scripted_output(&self, command: &str) -> Option<CommandOutput> {
        let mut scripted = self.scripted.lock();
        let (_, outputs) = scripted.iter_mut().find(|(pattern, _)| command.contains(pattern.as_str()))?;
        if outputs.len() > 1 {
            outputs.pop_front()
        } else {
            outputs.front().cloned()
        }
    }

    fn builtin(&self, command: &str) -> CommandOutput {
        if let Some(path) = command.strip_prefix("test -f ") {
            let exists = self.files.lock().contains_key(&unquote(path));
            return output(if exists { 0 } else { 1 }, "", "");
        }
        if let Some(path) = command.strip_prefix("cat '") {
            return match self.files.lock().get(&unquote(path)) {
                Some(contents) => output(0, contents, ""),
                None => output(1, "", "No such file or directory"),
            };
        }
        if let Some(rest) = command.strip_prefix("echo ") {
            if let Some((payload, sink)) = rest.split_once(" | base64 -d | ") {
                let decoded = STANDARD.decode(payload.trim()).unwrap_or_default();
                let path = sink
                    .trim_start_matches("sudo tee ")
                    .trim_start_matches("cat > ")
                    .trim_end_matches(" > /dev/null");
                self.files
                    .lock()
                    .insert(unquote(path), String::from_utf8_lossy(&decoded).to_string());
                return output(0, "", "");
            }
        }
        if command.contains("pm2 jlist") {
            return output(0, r#"[{"name":"devspace-dev","pm2_env":{"status":"online"}}]"#, "");
        }
        output(0, "", "")
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        self.commands.lock().push(command.to_string());
        Ok(self.scripted_output(command).unwrap_or_else(|| self.builtin(command)))
    }
}

pub struct MockConnector {
    pub session: Arc<MockSession>,
    pub hosts: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(session: Arc<MockSession>) -> Self {
        Self {
            session,
            hosts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RemoteConnector for MockConnector {
    async fn connect(&self, host: &str) -> Result<Arc<dyn RemoteSession>, ShellError> {
        self.hosts.lock().push(host.to_string());
        Ok(self.session.clone())
    }
}

#[derive(Default)]
pub struct MockDns {
    pub records: Mutex<HashMap<String, DnsRecord>>,
    pub fail_deletes: bool,
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
        if self.fail_deletes {
            return Err(DnsError::Provider("dns unavailable".into()));
        }
        match self.records.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(DnsError::NotFound(name.to_string())),
        }
    }
}

pub struct MockBackend {
    pub project: BackendProject,
    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            project: BackendProject {
                id: "proj-1".into(),
                url: "https://proj-1.backend.test".into(),
            },
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BackendProjectProvider for MockBackend {
    async fn create_project(&self, name: &str) -> Result<BackendProject, BackendProjectError> {
        self.created.lock().push(name.to_string());
        Ok(self.project.clone())
    }

    async fn delete_project(&self, id: &str) -> Result<(), BackendProjectError> {
        self.deleted.lock().push(id.to_string());
        Ok(())
    }
}

/// Compute provider whose operations complete immediately.
pub struct MockCompute {
    pub ip: Mutex<String>,
    pub calls: Mutex<Vec<String>>,
    pub missing: bool,
    pub fail_create: bool,
}

impl Default for MockCompute {
    fn default() -> Self {
        Self {
            ip: Mutex::new("34.1.2.3".into()),
            calls: Mutex::new(Vec::new()),
            missing: false,
            fail_create: false,
        }
    }
}

impl MockCompute {
    fn record(&self, call: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        self.calls.lock().push(format!("{}:{}", call, name));
        if self.missing && call != "create" {
            return Err(ComputeError::NotFound(name.to_string()));
        }
        Ok(OperationHandle {
            name: format!("op-{}", call),
            zone: "us-central1-a".into(),
        })
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| c.starts_with(call))
    }
}

#[async_trait]
impl ComputeProvider for MockCompute {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<OperationHandle, ComputeError> {
        if self.fail_create {
            return Err(ComputeError::Http("quota exceeded".into()));
        }
        self.record("create", &spec.name)
    }

    async fn delete_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        self.record("delete", name)
    }

    async fn suspend_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        self.record("suspend", name)
    }

    async fn resume_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        self.record("resume", name)
    }

    async fn get_instance(&self, zone: &str, name: &str) -> Result<InstanceInfo, ComputeError> {
        Ok(InstanceInfo {
            name: name.to_string(),
            zone: zone.to_string(),
            status: "RUNNING".into(),
            external_ip: Some(self.ip.lock().clone()),
        })
    }

    async fn poll_operation(&self, _operation: &OperationHandle) -> Result<OperationStatus, ComputeError> {
        Ok(OperationStatus::Done { error: None })
    }
}

#[derive(Default)]
pub struct MockSourceControl {
    pub created: Mutex<Vec<TemplateRequest>>,
    pub deleted: Mutex<Vec<String>>,
    pub directories: HashMap<String, Vec<ContentEntry>>,
    pub files: HashMap<String, String>,
    pub missing_on_delete: bool,
    pub fail_create: bool,
}

#[async_trait]
impl SourceControlProvider for MockSourceControl {
    async fn generate_from_template(
        &self,
        request: &TemplateRequest,
        _credentials: &GitHubCredentials,
    ) -> Result<RepositoryHandle, SourceControlError> {
        if self.fail_create {
            return Err(SourceControlError::RepositoryCreate {
                status: 422,
                message: "name already exists on this account".into(),
            });
        }
        self.created.lock().push(request.clone());
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
        self.deleted.lock().push(format!("{}/{}", owner, name));
        if self.missing_on_delete {
            return Err(SourceControlError::NotFound(format!("{}/{}", owner, name)));
        }
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

/// LLM provider returning queued response texts in order.
#[derive(Default)]
pub struct MockLlm {
    pub responses: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl MockLlm {
    pub fn with_responses(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl LLMProvider for MockLlm {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LLMError> {
        self.requests.lock().push(request.clone());
        let text = self
            .responses
            .lock()
            .pop_front()
            .ok_or_else(|| LLMError::Provider("no scripted response".into()))?;
        Ok(GenerationResponse {
            text,
            usage: TokenUsage::default(),
            provider: "mock".into(),
            model: "mock-model".into(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}
