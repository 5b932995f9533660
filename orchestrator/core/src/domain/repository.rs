// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root: one repository per
//! aggregate, interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ApplicationRepository` | `Application` | `InMemoryApplicationRepository`, `PostgresApplicationRepository` |
//! | `SourceRepoRepository` | `SourceRepo` | `InMemorySourceRepoRepository`, `PostgresSourceRepoRepository` |
//! | `GitHubAccountRepository` | `GitHubAccount` | `InMemoryGitHubAccountRepository`, `PostgresGitHubAccountRepository` |
//! | `MachineRepository` | `Machine` | `InMemoryMachineRepository`, `PostgresMachineRepository` |
//! | `DocumentRepository` | `Document` | `InMemoryDocumentRepository`, `PostgresDocumentRepository` |
//! | `ConversationRepository` | `Conversation` | `InMemoryConversationRepository`, `PostgresConversationRepository` |
//! | `MessageRepository` | `Message` | `InMemoryMessageRepository`, `PostgresMessageRepository` |
//! | `SourceFileRepository` | `SourceFile` | `InMemorySourceFileRepository`, `PostgresSourceFileRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at startup from the `database`
//! section of `devspace-config.yaml`. In-memory implementations are used for
//! development and testing; PostgreSQL implementations for production.
//!
//! `insert` methods are insert-if-absent: a second insert with the same
//! identity fails with [`RepositoryError::Conflict`].

use async_trait::async_trait;

use crate::domain::application::{Application, ApplicationId, GitHubAccountId};
use crate::domain::document::{
    Conversation, ConversationId, Document, DocumentId, Message, MessageId,
};
use crate::domain::machine::{Machine, MachineId};
use crate::domain::source_file::SourceFile;
use crate::domain::source_repo::{
    GitHubAccount, GitHubCredentials, RepositoryAccess, SourceRepo, SourceRepoId,
};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Application>, RepositoryError>;

    async fn delete(&self, id: ApplicationId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SourceRepoRepository: Send + Sync {
    /// Insert; fails with `Conflict` if the application already has a
    /// repository.
    async fn insert(&self, repository: &SourceRepo) -> Result<(), RepositoryError>;

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<SourceRepo>, RepositoryError>;

    /// Repository joined with the credentials of its linked account. Returns
    /// `None` when no repository exists; a linked account that cannot be found
    /// is `NotFound`. Repositories without a linked account are returned with
    /// `fallback` credentials.
    async fn find_access(
        &self,
        application_id: ApplicationId,
        fallback: Option<&GitHubCredentials>,
    ) -> Result<Option<RepositoryAccess>, RepositoryError>;

    async fn delete(&self, id: SourceRepoId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait GitHubAccountRepository: Send + Sync {
    async fn save(&self, account: &GitHubAccount) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &GitHubAccountId) -> Result<Option<GitHubAccount>, RepositoryError>;
}

#[async_trait]
pub trait MachineRepository: Send + Sync {
    /// Insert; fails with `Conflict` if the application already has a
    /// machine.
    async fn insert(&self, machine: &Machine) -> Result<(), RepositoryError>;

    /// Update an existing machine.
    async fn save(&self, machine: &Machine) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: MachineId) -> Result<Option<Machine>, RepositoryError>;

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<Machine>, RepositoryError>;

    async fn delete(&self, id: MachineId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert; fails with `Conflict` if the application already has a
    /// document.
    async fn insert(&self, document: &Document) -> Result<(), RepositoryError>;

    async fn save(&self, document: &Document) -> Result<(), RepositoryError>;

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<Document>, RepositoryError>;

    async fn delete(&self, id: DocumentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn insert(&self, conversation: &Conversation) -> Result<(), RepositoryError>;

    async fn save(&self, conversation: &Conversation) -> Result<(), RepositoryError>;

    async fn find_by_document(&self, document_id: DocumentId) -> Result<Option<Conversation>, RepositoryError>;

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Append a message, assigning `order = count + 1`. Returns the stored
    /// message.
    async fn append(&self, message: Message) -> Result<Message, RepositoryError>;

    async fn save(&self, message: &Message) -> Result<(), RepositoryError>;

    /// Messages of a conversation ordered by `order`.
    async fn list_by_conversation(&self, conversation_id: ConversationId) -> Result<Vec<Message>, RepositoryError>;

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError>;

    async fn delete_by_conversation(&self, conversation_id: ConversationId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SourceFileRepository: Send + Sync {
    /// Insert or replace the file at `(repository_id, path)`.
    async fn upsert(&self, file: &SourceFile) -> Result<(), RepositoryError>;

    async fn list_by_repository(&self, repository_id: SourceRepoId) -> Result<Vec<SourceFile>, RepositoryError>;

    async fn delete_by_repository(&self, repository_id: SourceRepoId) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
