// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! GitHub Source Control Adapter
//!
//! REST client for the GitHub endpoints the provisioning pipeline needs:
//! template generation, repository deletion, directory listing and raw file
//! content.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Implements [`SourceControlProvider`] over the GitHub REST API
//! - **Integration:** GitHub API → Source provisioner

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::source_repo::{
    ContentEntry, GitHubCredentials, RepositoryHandle, SourceControlError, SourceControlProvider,
    TemplateRequest,
};

const USER_AGENT: &str = "devspace-orchestrator";
const API_VERSION: &str = "2022-11-28";

pub struct GitHubAdapter {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    owner: &'a str,
    name: &'a str,
    private: bool,
    include_all_branches: bool,
}

#[derive(Deserialize)]
struct RepositoryPayload {
    name: String,
    owner: OwnerPayload,
    clone_url: String,
    html_url: String,
}

#[derive(Deserialize)]
struct OwnerPayload {
    login: String,
}

impl GitHubAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn authorized(&self, builder: RequestBuilder, credentials: &GitHubCredentials) -> RequestBuilder {
        builder
            .bearer_auth(&credentials.token)
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Each path component becomes one percent-encoded URL segment.
    fn contents_url(&self, owner: &str, name: &str, path: &str) -> Result<Url, SourceControlError> {
        let invalid = || SourceControlError::Http(format!("invalid API base URL {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["repos", owner, name, "contents"])
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }
}

async fn error_for_status(response: Response, what: &str) -> SourceControlError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => SourceControlError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceControlError::Unauthorized(format!("{}: {}", what, body))
        }
        _ => SourceControlError::Http(format!("{} returned HTTP {}: {}", what, status, body)),
    }
}

#[async_trait]
impl SourceControlProvider for GitHubAdapter {
    async fn generate_from_template(
        &self,
        request: &TemplateRequest,
        credentials: &GitHubCredentials,
    ) -> Result<RepositoryHandle, SourceControlError> {
        let url = format!(
            "{}/repos/{}/{}/generate",
            self.base_url, request.template_owner, request.template_name
        );
        debug!("Generating {}/{} from template", request.owner, request.name);

        let response = self
            .authorized(self.client.post(&url), credentials)
            .header("Accept", "application/vnd.github+json")
            .json(&GenerateBody {
                owner: &request.owner,
                name: &request.name,
                private: request.private,
                include_all_branches: false,
            })
            .send()
            .await
            .map_err(|e| SourceControlError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceControlError::RepositoryCreate {
                status: status.as_u16(),
                message,
            });
        }

        let payload: RepositoryPayload = response
            .json()
            .await
            .map_err(|e| SourceControlError::Decode(e.to_string()))?;

        Ok(RepositoryHandle {
            owner: payload.owner.login,
            name: payload.name,
            clone_url: payload.clone_url,
            html_url: payload.html_url,
        })
    }

    async fn delete_repository(
        &self,
        owner: &str,
        name: &str,
        credentials: &GitHubCredentials,
    ) -> Result<(), SourceControlError> {
        let url = format!("{}/repos/{}/{}", self.base_url, owner, name);
        let response = self
            .authorized(self.client.delete(&url), credentials)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| SourceControlError::Http(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_for_status(response, &format!("repository {}/{}", owner, name)).await)
        }
    }

    async fn list_directory(
        &self,
        owner: &str,
        name: &str,
        path: &str,
        credentials: &GitHubCredentials,
    ) -> Result<Vec<ContentEntry>, SourceControlError> {
        let response = self
            .authorized(self.client.get(self.contents_url(owner, name, path)?), credentials)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| SourceControlError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_for_status(response, &format!("{}/{}:{}", owner, name, path)).await);
        }

        // A file path returns a single object rather than an array
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceControlError::Decode(e.to_string()))?;
        if !value.is_array() {
            return Err(SourceControlError::Decode(format!("{} is not a directory", path)));
        }
        serde_json::from_value(value).map_err(|e| SourceControlError::Decode(e.to_string()))
    }

    async fn get_file_content(
        &self,
        owner: &str,
        name: &str,
        path: &str,
        credentials: &GitHubCredentials,
    ) -> Result<String, SourceControlError> {
        let response = self
            .authorized(self.client.get(self.contents_url(owner, name, path)?), credentials)
            .header("Accept", "application/vnd.github.raw+json")
            .send()
            .await
            .map_err(|e| SourceControlError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_for_status(response, &format!("{}/{}:{}", owner, name, path)).await);
        }

        response
            .text()
            .await
            .map_err(|e| SourceControlError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source_repo::EntryKind;

    fn creds() -> GitHubCredentials {
        GitHubCredentials {
            username: "octo".into(),
            token: "ghp_test".into(),
        }
    }

    #[tokio::test]
    async fn test_generate_from_template() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/acme/starter/generate")
            .match_header("authorization", "Bearer ghp_test")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "owner": "acme",
                "name": "shop-1a2b3c4d",
                "private": true,
                "include_all_branches": false
            })))
            .with_status(201)
            .with_body(
                r#"{"name":"shop-1a2b3c4d","owner":{"login":"acme"},
                    "clone_url":"https://github.com/acme/shop-1a2b3c4d.git",
                    "html_url":"https://github.com/acme/shop-1a2b3c4d"}"#,
            )
            .create_async()
            .await;

        let adapter = GitHubAdapter::new(server.url());
        let handle = adapter
            .generate_from_template(
                &TemplateRequest {
                    template_owner: "acme".into(),
                    template_name: "starter".into(),
                    owner: "acme".into(),
                    name: "shop-1a2b3c4d".into(),
                    private: true,
                },
                &creds(),
            )
            .await
            .unwrap();

        assert_eq!(handle.owner, "acme");
        assert_eq!(handle.clone_url, "https://github.com/acme/shop-1a2b3c4d.git");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_accepts_any_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/repos/acme/starter/generate")
            .with_status(202)
            .with_body(
                r#"{"name":"queued","owner":{"login":"acme"},
                    "clone_url":"https://github.com/acme/queued.git",
                    "html_url":"https://github.com/acme/queued"}"#,
            )
            .create_async()
            .await;

        let adapter = GitHubAdapter::new(server.url());
        let handle = adapter
            .generate_from_template(
                &TemplateRequest {
                    template_owner: "acme".into(),
                    template_name: "starter".into(),
                    owner: "acme".into(),
                    name: "queued".into(),
                    private: true,
                },
                &creds(),
            )
            .await
            .unwrap();
        assert_eq!(handle.name, "queued");
    }

    #[tokio::test]
    async fn test_generate_failure_carries_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/repos/acme/starter/generate")
            .with_status(422)
            .with_body(r#"{"message":"Name already exists on this account"}"#)
            .create_async()
            .await;

        let adapter = GitHubAdapter::new(server.url());
        let err = adapter
            .generate_from_template(
                &TemplateRequest {
                    template_owner: "acme".into(),
                    template_name: "starter".into(),
                    owner: "acme".into(),
                    name: "dup".into(),
                    private: false,
                },
                &creds(),
            )
            .await
            .unwrap_err();

        match err {
            SourceControlError::RepositoryCreate { status, message } => {
                assert_eq!(status, 422);
                assert!(message.contains("already exists"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_missing_repository_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/repos/acme/gone")
            .with_status(404)
            .create_async()
            .await;

        let adapter = GitHubAdapter::new(server.url());
        let err = adapter.delete_repository("acme", "gone", &creds()).await.unwrap_err();
        assert!(matches!(err, SourceControlError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_directory_and_raw_content() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/repos/acme/shop/contents/src")
            .with_status(200)
            .with_body(
                r#"[{"name":"app","path":"src/app","type":"dir","sha":"x"},
                    {"name":"index.ts","path":"src/index.ts","type":"file","size":10}]"#,
            )
            .create_async()
            .await;
        let _raw = server
            .mock("GET", "/repos/acme/shop/contents/src/index.ts")
            .match_header("accept", "application/vnd.github.raw+json")
            .with_status(200)
            .with_body("export const x = 1;")
            .create_async()
            .await;

        let adapter = GitHubAdapter::new(server.url());
        let entries = adapter.list_directory("acme", "shop", "src", &creds()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Dir);
        assert_eq!(entries[1].path, "src/index.ts");

        let content = adapter
            .get_file_content("acme", "shop", "src/index.ts", &creds())
            .await
            .unwrap();
        assert_eq!(content, "export const x = 1;");
    }

    #[tokio::test]
    async fn test_content_paths_are_percent_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/shop/contents/docs/notes%20%231%3F.md")
            .with_status(200)
            .with_body("# Notes")
            .create_async()
            .await;

        let adapter = GitHubAdapter::new(server.url());
        let content = adapter
            .get_file_content("acme", "shop", "/docs/notes #1?.md", &creds())
            .await
            .unwrap();
        assert_eq!(content, "# Notes");
        mock.assert_async().await;
    }

    #[test]
    fn test_contents_url_keeps_base_path() {
        let adapter = GitHubAdapter::new("https://ghe.example.com/api/v3/");
        let url = adapter.contents_url("acme", "shop", "").unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/acme/shop/contents");
    }
}
