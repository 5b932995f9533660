// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Google Cloud adapters - Compute Engine instances and Cloud DNS records,
// both authenticated with a service-account token source.

pub mod auth;
pub mod compute;
pub mod dns;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::compute::ComputeCredentials;
use crate::domain::config::{resolve_env_value, ComputeConfig};

pub use auth::{ServiceAccountTokenSource, StaticTokenSource, TokenSource};
pub use compute::GceComputeAdapter;
pub use dns::CloudDnsAdapter;

#[derive(Deserialize)]
struct ServiceAccountKeyFile {
    project_id: Option<String>,
    client_email: String,
    private_key: String,
}

/// Service-account credentials from the key file if configured, otherwise
/// from the inline email and key.
pub fn load_credentials(config: &ComputeConfig) -> Result<ComputeCredentials> {
    if let Some(path) = &config.credentials_file {
        let raw = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read credentials file {}", path))?;
        let key: ServiceAccountKeyFile =
            serde_json::from_str(&raw).context("Failed to parse service-account key file")?;
        return Ok(ComputeCredentials {
            project_id: key.project_id.unwrap_or_else(|| config.project_id.clone()),
            client_email: key.client_email,
            private_key: key.private_key,
        });
    }

    let client_email = config
        .client_email
        .as_deref()
        .context("compute.client_email or compute.credentials_file is required")?;
    let private_key = config
        .private_key
        .as_deref()
        .context("compute.private_key or compute.credentials_file is required")?;

    Ok(ComputeCredentials {
        project_id: config.project_id.clone(),
        client_email: resolve_env_value(client_email)?,
        private_key: resolve_env_value(private_key)?,
    })
}
