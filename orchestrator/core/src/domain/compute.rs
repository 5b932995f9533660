// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Compute provider boundary (Google Compute Engine in production).
//!
//! Mutating calls return an [`OperationHandle`] for a long-running provider
//! operation; the application layer polls it with
//! [`ComputeProvider::poll_operation`] until it completes or times out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Service-account credentials for the compute project.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeCredentials {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
}

impl std::fmt::Debug for ComputeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeCredentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// What to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    pub source_image: String,
    pub disk_size_gb: u32,
    pub network_tags: Vec<String>,
    /// `user:key` entry installed so the orchestrator can reach the VM.
    pub ssh_public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub name: String,
    pub zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Done { error: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub name: String,
    pub zone: String,
    /// Provider status string, e.g. `RUNNING`, `SUSPENDED`.
    pub status: String,
    pub external_ip: Option<String>,
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Compute operation {operation} failed: {detail}")]
    OperationFailed { operation: String, detail: String },

    #[error("Instance not found: {0}")]
    NotFound(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<OperationHandle, ComputeError>;

    async fn delete_instance(&self, zone: &str, name: &str) -> Result<OperationHandle, ComputeError>;

    async fn suspend_instance(&self, zone: &str, name: &str) -> Result<OperationHandle, ComputeError>;

    async fn resume_instance(&self, zone: &str, name: &str) -> Result<OperationHandle, ComputeError>;

    async fn get_instance(&self, zone: &str, name: &str) -> Result<InstanceInfo, ComputeError>;

    async fn poll_operation(&self, operation: &OperationHandle) -> Result<OperationStatus, ComputeError>;
}
