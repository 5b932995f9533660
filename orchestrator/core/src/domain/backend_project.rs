// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Optional hosted backend project (database/auth service) created alongside
//! each development machine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendProject {
    pub id: String,
    pub url: String,
}

impl BackendProject {
    /// Both the id and the url must be present for the project to be usable.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.url.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum BackendProjectError {
    #[error("Backend project not found: {0}")]
    NotFound(String),

    #[error("Backend project response was incomplete: {0}")]
    Invalid(String),

    #[error("Backend provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait BackendProjectProvider: Send + Sync {
    async fn create_project(&self, name: &str) -> Result<BackendProject, BackendProjectError>;

    async fn delete_project(&self, id: &str) -> Result<(), BackendProjectError>;
}
