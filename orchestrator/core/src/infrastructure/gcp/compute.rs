// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Compute Engine adapter.
//!
//! Every mutating call returns a zone operation; callers poll it through
//! [`ComputeProvider::poll_operation`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::auth::TokenSource;
use crate::domain::compute::{
    ComputeError, ComputeProvider, InstanceInfo, InstanceSpec, OperationHandle, OperationStatus,
};

pub struct GceComputeAdapter {
    client: Client,
    base_url: String,
    project_id: String,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Deserialize)]
struct OperationPayload {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<OperationErrorPayload>,
}

#[derive(Deserialize)]
struct OperationErrorPayload {
    #[serde(default)]
    errors: Vec<OperationErrorItem>,
}

#[derive(Deserialize)]
struct OperationErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstancePayload {
    name: String,
    status: String,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterfacePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterfacePayload {
    #[serde(default)]
    access_configs: Vec<AccessConfigPayload>,
}

#[derive(Deserialize)]
struct AccessConfigPayload {
    #[serde(default, rename = "natIP")]
    nat_ip: Option<String>,
}

impl GceComputeAdapter {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            tokens,
        }
    }

    fn zone_url(&self, zone: &str) -> String {
        format!("{}/projects/{}/zones/{}", self.base_url, self.project_id, zone)
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ComputeError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| ComputeError::Auth(e.to_string()))?;
        Ok(builder.bearer_auth(token))
    }

    async fn send_operation(
        &self,
        builder: RequestBuilder,
        zone: &str,
        what: &str,
    ) -> Result<OperationHandle, ComputeError> {
        let response = self
            .authorized(builder)
            .await?
            .send()
            .await
            .map_err(|e| ComputeError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_for_status(response, what).await);
        }

        let operation: OperationPayload = response
            .json()
            .await
            .map_err(|e| ComputeError::Http(format!("Failed to parse operation: {}", e)))?;

        Ok(OperationHandle {
            name: operation.name,
            zone: zone.to_string(),
        })
    }
}

async fn error_for_status(response: Response, what: &str) -> ComputeError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => ComputeError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ComputeError::Auth(format!("{}: {}", what, body)),
        _ => ComputeError::Http(format!("{} returned HTTP {}: {}", what, status, body)),
    }
}

/// Request body for `instances.insert`.
fn instance_body(spec: &InstanceSpec) -> serde_json::Value {
    let mut body = json!({
        "name": spec.name,
        "machineType": format!("zones/{}/machineTypes/{}", spec.zone, spec.machine_type),
        "disks": [{
            "boot": true,
            "autoDelete": true,
            "initializeParams": {
                "sourceImage": spec.source_image,
                "diskSizeGb": spec.disk_size_gb.to_string(),
            }
        }],
        "networkInterfaces": [{
            "network": "global/networks/default",
            "accessConfigs": [{ "type": "ONE_TO_ONE_NAT", "name": "External NAT" }]
        }],
        "tags": { "items": spec.network_tags },
    });

    if let Some(key) = &spec.ssh_public_key {
        body["metadata"] = json!({ "items": [{ "key": "ssh-keys", "value": key }] });
    }
    body
}

#[async_trait]
impl ComputeProvider for GceComputeAdapter {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<OperationHandle, ComputeError> {
        let url = format!("{}/instances", self.zone_url(&spec.zone));
        let builder = self.client.post(&url).json(&instance_body(spec));
        self.send_operation(builder, &spec.zone, &format!("insert {}", spec.name)).await
    }

    async fn delete_instance(&self, zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        let url = format!("{}/instances/{}", self.zone_url(zone), name);
        self.send_operation(self.client.delete(&url), zone, &format!("instance {}", name))
            .await
    }

    async fn suspend_instance(&self, zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        let url = format!("{}/instances/{}/suspend", self.zone_url(zone), name);
        self.send_operation(self.client.post(&url), zone, &format!("instance {}", name))
            .await
    }

    async fn resume_instance(&self, zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
        let url = format!("{}/instances/{}/resume", self.zone_url(zone), name);
        self.send_operation(self.client.post(&url), zone, &format!("instance {}", name))
            .await
    }

    async fn get_instance(&self, zone: &str, name: &str) -> Result<InstanceInfo, ComputeError> {
        let url = format!("{}/instances/{}", self.zone_url(zone), name);
        let response = self
            .authorized(self.client.get(&url))
            .await?
            .send()
            .await
            .map_err(|e| ComputeError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_for_status(response, &format!("instance {}", name)).await);
        }

        let instance: InstancePayload = response
            .json()
            .await
            .map_err(|e| ComputeError::Http(format!("Failed to parse instance: {}", e)))?;

        let external_ip = instance
            .network_interfaces
            .iter()
            .flat_map(|nic| nic.access_configs.iter())
            .find_map(|ac| ac.nat_ip.clone());

        Ok(InstanceInfo {
            name: instance.name,
            zone: zone.to_string(),
            status: instance.status,
            external_ip,
        })
    }

    async fn poll_operation(&self, operation: &OperationHandle) -> Result<OperationStatus, ComputeError> {
        let url = format!("{}/operations/{}", self.zone_url(&operation.zone), operation.name);
        let response = self
            .authorized(self.client.get(&url))
            .await?
            .send()
            .await
            .map_err(|e| ComputeError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_for_status(response, &format!("operation {}", operation.name)).await);
        }

        let payload: OperationPayload = response
            .json()
            .await
            .map_err(|e| ComputeError::Http(format!("Failed to parse operation: {}", e)))?;

        Ok(match payload.status.as_str() {
            "DONE" => OperationStatus::Done {
                error: payload.error.map(|e| {
                    e.errors
                        .iter()
                        .map(|item| format!("{}: {}", item.code, item.message))
                        .collect::<Vec<_>>()
                        .join("; ")
                }),
            },
            "RUNNING" => OperationStatus::Running,
            _ => OperationStatus::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::gcp::auth::StaticTokenSource;

    fn adapter(url: String) -> GceComputeAdapter {
        GceComputeAdapter::new(url, "demo", Arc::new(StaticTokenSource("ya29.test".into())))
    }

    fn spec() -> InstanceSpec {
        InstanceSpec {
            name: "devspace-1a2b3c4d".into(),
            zone: "us-central1-a".into(),
            machine_type: "e2-medium".into(),
            source_image: "projects/debian-cloud/global/images/family/debian-12".into(),
            disk_size_gb: 20,
            network_tags: vec!["http-server".into()],
            ssh_public_key: Some("devspace:ssh-ed25519 AAAA".into()),
        }
    }

    #[test]
    fn test_instance_body() {
        let body = instance_body(&spec());
        assert_eq!(body["machineType"], "zones/us-central1-a/machineTypes/e2-medium");
        assert_eq!(body["disks"][0]["initializeParams"]["diskSizeGb"], "20");
        assert_eq!(body["tags"]["items"][0], "http-server");
        assert_eq!(body["metadata"]["items"][0]["key"], "ssh-keys");
    }

    #[tokio::test]
    async fn test_create_instance_returns_operation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/projects/demo/zones/us-central1-a/instances")
            .match_header("authorization", "Bearer ya29.test")
            .with_status(200)
            .with_body(r#"{"name":"operation-123","status":"RUNNING"}"#)
            .create_async()
            .await;

        let op = adapter(server.url()).create_instance(&spec()).await.unwrap();
        assert_eq!(op.name, "operation-123");
        assert_eq!(op.zone, "us-central1-a");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_operation_with_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/demo/zones/z/operations/op-1")
            .with_status(200)
            .with_body(
                r#"{"name":"op-1","status":"DONE",
                    "error":{"errors":[{"code":"QUOTA_EXCEEDED","message":"CPUS quota"}]}}"#,
            )
            .create_async()
            .await;

        let status = adapter(server.url())
            .poll_operation(&OperationHandle { name: "op-1".into(), zone: "z".into() })
            .await
            .unwrap();
        assert_eq!(
            status,
            OperationStatus::Done { error: Some("QUOTA_EXCEEDED: CPUS quota".into()) }
        );
    }

    #[tokio::test]
    async fn test_get_instance_reads_nat_ip() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/demo/zones/z/instances/vm")
            .with_status(200)
            .with_body(
                r#"{"name":"vm","status":"RUNNING",
                    "networkInterfaces":[{"accessConfigs":[{"natIP":"34.1.2.3"}]}]}"#,
            )
            .create_async()
            .await;

        let info = adapter(server.url()).get_instance("z", "vm").await.unwrap();
        assert_eq!(info.external_ip.as_deref(), Some("34.1.2.3"));
        assert_eq!(info.status, "RUNNING");
    }

    #[tokio::test]
    async fn test_delete_missing_instance() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/projects/demo/zones/z/instances/vm")
            .with_status(404)
            .create_async()
            .await;

        let err = adapter(server.url()).delete_instance("z", "vm").await.unwrap_err();
        assert!(matches!(err, ComputeError::NotFound(_)));
    }
}
