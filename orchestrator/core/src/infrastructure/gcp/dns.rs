// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cloud DNS adapter.
//!
//! Records are changed through the managed zone's `changes` endpoint. A
//! deletion must repeat the exact record set, so it is looked up first.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::auth::TokenSource;
use crate::domain::dns::{DnsError, DnsProvider, DnsRecord};

pub struct CloudDnsAdapter {
    client: Client,
    base_url: String,
    project_id: String,
    managed_zone: String,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResourceRecordSet {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    ttl: u32,
    rrdatas: Vec<String>,
}

#[derive(Deserialize)]
struct RecordSetList {
    #[serde(default)]
    rrsets: Vec<ResourceRecordSet>,
}

/// Cloud DNS names are absolute and end with a dot.
fn absolute(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

impl CloudDnsAdapter {
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        managed_zone: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            managed_zone: managed_zone.into(),
            tokens,
        }
    }

    fn zone_url(&self) -> String {
        format!(
            "{}/projects/{}/managedZones/{}",
            self.base_url, self.project_id, self.managed_zone
        )
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, DnsError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| DnsError::Auth(e.to_string()))?;
        Ok(builder.bearer_auth(token))
    }

    async fn submit_change(&self, change: serde_json::Value, name: &str) -> Result<(), DnsError> {
        let url = format!("{}/changes", self.zone_url());
        let response = self
            .authorized(self.client.post(&url).json(&change))
            .await?
            .send()
            .await
            .map_err(|e| DnsError::Provider(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::CONFLICT => DnsError::AlreadyExists(name.to_string()),
            StatusCode::NOT_FOUND => DnsError::NotFound(name.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DnsError::Auth(body),
            _ => DnsError::Provider(format!("HTTP {}: {}", status, body)),
        })
    }

    async fn find_record_set(&self, name: &str, record_type: &str) -> Result<Option<ResourceRecordSet>, DnsError> {
        let url = format!("{}/rrsets", self.zone_url());
        let fqdn = absolute(name);
        let response = self
            .authorized(
                self.client
                    .get(&url)
                    .query(&[("name", fqdn.as_str()), ("type", record_type)]),
            )
            .await?
            .send()
            .await
            .map_err(|e| DnsError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsError::Provider(format!("HTTP {}: {}", status, body)));
        }

        let list: RecordSetList = response
            .json()
            .await
            .map_err(|e| DnsError::Provider(format!("Failed to parse record sets: {}", e)))?;

        Ok(list
            .rrsets
            .into_iter()
            .find(|r| r.name == fqdn && r.record_type == record_type))
    }
}

#[async_trait]
impl DnsProvider for CloudDnsAdapter {
    async fn create_record(&self, record: &DnsRecord) -> Result<(), DnsError> {
        let rrset = ResourceRecordSet {
            name: absolute(&record.name),
            record_type: record.record_type.clone(),
            ttl: record.ttl,
            rrdatas: record.data.clone(),
        };
        debug!("Creating {} record {}", rrset.record_type, rrset.name);
        self.submit_change(json!({ "additions": [rrset] }), &record.name)
            .await
    }

    async fn delete_record(&self, name: &str, record_type: &str) -> Result<(), DnsError> {
        let Some(rrset) = self.find_record_set(name, record_type).await? else {
            return Err(DnsError::NotFound(name.to_string()));
        };
        debug!("Deleting {} record {}", record_type, rrset.name);
        self.submit_change(json!({ "deletions": [rrset] }), name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::gcp::auth::StaticTokenSource;

    fn adapter(url: String) -> CloudDnsAdapter {
        CloudDnsAdapter::new(url, "demo", "apps-zone", Arc::new(StaticTokenSource("t".into())))
    }

    #[tokio::test]
    async fn test_create_record_sends_absolute_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/projects/demo/managedZones/apps-zone/changes")
            .match_body(mockito::Matcher::Json(json!({
                "additions": [{
                    "name": "shop.apps.example.com.",
                    "type": "A",
                    "ttl": 300,
                    "rrdatas": ["34.1.2.3"]
                }]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        adapter(server.url())
            .create_record(&DnsRecord::a("shop.apps.example.com", "34.1.2.3", 300))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_conflict_maps_to_already_exists() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/projects/demo/managedZones/apps-zone/changes")
            .with_status(409)
            .create_async()
            .await;

        let err = adapter(server.url())
            .create_record(&DnsRecord::a("shop.apps.example.com", "34.1.2.3", 300))
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_record_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/demo/managedZones/apps-zone/rrsets")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"rrsets":[]}"#)
            .create_async()
            .await;

        let err = adapter(server.url())
            .delete_record("gone.apps.example.com", "A")
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_repeats_existing_record_set() {
        let mut server = mockito::Server::new_async().await;
        let _lookup = server
            .mock("GET", "/projects/demo/managedZones/apps-zone/rrsets")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"rrsets":[{"name":"shop.apps.example.com.","type":"A","ttl":60,"rrdatas":["1.1.1.1"]}]}"#)
            .create_async()
            .await;
        let change = server
            .mock("POST", "/projects/demo/managedZones/apps-zone/changes")
            .match_body(mockito::Matcher::PartialJson(json!({
                "deletions": [{"name": "shop.apps.example.com.", "ttl": 60}]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        adapter(server.url())
            .delete_record("shop.apps.example.com", "A")
            .await
            .unwrap();
        change.assert_async().await;
    }
}
