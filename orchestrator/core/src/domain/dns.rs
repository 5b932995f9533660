// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! DNS provider boundary and subdomain naming.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest label DNS allows.
pub const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Fully-qualified name without the trailing dot.
    pub name: String,
    pub record_type: String,
    pub ttl: u32,
    pub data: Vec<String>,
}

impl DnsRecord {
    pub fn a(name: impl Into<String>, address: impl Into<String>, ttl: u32) -> Self {
        Self {
            name: name.into(),
            record_type: "A".to_string(),
            ttl,
            data: vec![address.into()],
        }
    }
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("DNS provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn create_record(&self, record: &DnsRecord) -> Result<(), DnsError>;

    /// Delete the record set with this name and type. Missing records surface
    /// as `NotFound`.
    async fn delete_record(&self, name: &str, record_type: &str) -> Result<(), DnsError>;
}

/// Turn an arbitrary name into a DNS label: lowercase, every character
/// outside `[a-z0-9]` replaced by `-`, runs of `-` collapsed, at most 63
/// characters, no leading or trailing `-`.
pub fn sanitize_subdomain(name: &str) -> String {
    let mut label = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && label.ends_with('-') {
            continue;
        }
        label.push(c);
    }

    let truncated: String = label.chars().take(MAX_LABEL_LEN).collect();
    let trimmed = truncated.trim_matches('-');
    if trimmed.is_empty() {
        "app".to_string()
    } else {
        trimmed.to_string()
    }
}
