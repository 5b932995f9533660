// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend configuration,
//! keeping the Domain Layer free of infrastructure dependencies.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wires repository traits to in-memory or PostgreSQL implementations

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::domain::repository::{
    ApplicationRepository, ConversationRepository, DocumentRepository, GitHubAccountRepository,
    MachineRepository, MessageRepository, SourceFileRepository, SourceRepoRepository, StorageBackend,
};
use crate::infrastructure::repositories::postgres_application::{
    PostgresApplicationRepository, PostgresGitHubAccountRepository, PostgresMachineRepository,
    PostgresSourceRepoRepository,
};
use crate::infrastructure::repositories::postgres_document::{
    PostgresConversationRepository, PostgresDocumentRepository, PostgresMessageRepository,
    PostgresSourceFileRepository,
};
use crate::infrastructure::repositories::{
    InMemoryApplicationRepository, InMemoryConversationRepository, InMemoryDocumentRepository,
    InMemoryGitHubAccountRepository, InMemoryMachineRepository, InMemoryMessageRepository,
    InMemorySourceFileRepository, InMemorySourceRepoRepository,
};

/// Every repository the services need, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub applications: Arc<dyn ApplicationRepository>,
    pub accounts: Arc<dyn GitHubAccountRepository>,
    pub source_repos: Arc<dyn SourceRepoRepository>,
    pub machines: Arc<dyn MachineRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub source_files: Arc<dyn SourceFileRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        let accounts = InMemoryGitHubAccountRepository::new();
        let source_repos = InMemorySourceRepoRepository::new(&accounts);
        Self {
            applications: Arc::new(InMemoryApplicationRepository::new()),
            accounts: Arc::new(accounts),
            source_repos: Arc::new(source_repos),
            machines: Arc::new(InMemoryMachineRepository::new()),
            documents: Arc::new(InMemoryDocumentRepository::new()),
            conversations: Arc::new(InMemoryConversationRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            source_files: Arc::new(InMemorySourceFileRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            applications: Arc::new(PostgresApplicationRepository::new(pool.clone())),
            accounts: Arc::new(PostgresGitHubAccountRepository::new(pool.clone())),
            source_repos: Arc::new(PostgresSourceRepoRepository::new(pool.clone())),
            machines: Arc::new(PostgresMachineRepository::new(pool.clone())),
            documents: Arc::new(PostgresDocumentRepository::new(pool.clone())),
            conversations: Arc::new(PostgresConversationRepository::new(pool.clone())),
            messages: Arc::new(PostgresMessageRepository::new(pool.clone())),
            source_files: Arc::new(PostgresSourceFileRepository::new(pool)),
        }
    }
}

/// Creates the repository set for the configured backend. The PostgreSQL
/// backend requires a connected pool.
pub fn create_repositories(backend: &StorageBackend, pool: Option<PgPool>) -> Result<Repositories> {
    match backend {
        StorageBackend::InMemory => Ok(Repositories::in_memory()),
        StorageBackend::PostgreSQL(_) => {
            let pool = pool.context("PostgreSQL storage backend selected without a connection pool")?;
            Ok(Repositories::postgres(pool))
        }
    }
}
