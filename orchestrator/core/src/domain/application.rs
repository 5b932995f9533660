// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application aggregate: the user-facing unit that owns a source repository,
//! a development machine and an outline document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Short suffix used to keep provider-side names unique.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the owning user, issued by an external auth system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a linked GitHub account. The account itself is shared
/// configuration and is not owned by the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitHubAccountId(pub String);

impl std::fmt::Display for GitHubAccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    /// `None` marks a template application.
    pub owner: Option<UserId>,
    pub github_account: Option<GitHubAccountId>,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn new(name: impl Into<String>, owner: Option<UserId>, github_account: Option<GitHubAccountId>) -> Self {
        Self {
            id: ApplicationId::new(),
            name: name.into(),
            owner,
            github_account,
            created_at: Utc::now(),
        }
    }

    pub fn is_template(&self) -> bool {
        self.owner.is_none()
    }

    /// Name for the generated repository: the application name reduced to
    /// `[a-z0-9-]` plus a short id suffix.
    pub fn repository_name(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for c in self.name.chars() {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() {
                slug.push(c);
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-');
        let slug = if slug.is_empty() { "app" } else { slug };
        format!("{}-{}", slug, self.id.short())
    }
}
