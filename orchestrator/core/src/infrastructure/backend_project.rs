// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP adapter for the hosted backend-as-a-service that gives each
//! application its own project.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::domain::backend_project::{BackendProject, BackendProjectError, BackendProjectProvider};

pub struct HttpBackendProjectAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct CreateProjectBody<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct ProjectPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl HttpBackendProjectAdapter {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl BackendProjectProvider for HttpBackendProjectAdapter {
    async fn create_project(&self, name: &str) -> Result<BackendProject, BackendProjectError> {
        let response = self
            .client
            .post(format!("{}/projects", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&CreateProjectBody { name })
            .send()
            .await
            .map_err(|e| BackendProjectError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendProjectError::Provider(format!("HTTP {}: {}", status, body)));
        }

        let payload: ProjectPayload = response
            .json()
            .await
            .map_err(|e| BackendProjectError::Invalid(e.to_string()))?;

        Ok(BackendProject {
            id: payload.id.unwrap_or_default(),
            url: payload.url.unwrap_or_default(),
        })
    }

    async fn delete_project(&self, id: &str) -> Result<(), BackendProjectError> {
        let response = self
            .client
            .delete(format!("{}/projects/{}", self.endpoint, id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BackendProjectError::Provider(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(BackendProjectError::NotFound(id.to_string())),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(BackendProjectError::Provider(format!("HTTP {}: {}", s, body)))
            }
        }
    }
}
