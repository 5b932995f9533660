// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **postgres_application** - applications, linked GitHub accounts,
//!   source repositories and machines
//! - **postgres_document** - documents, conversations, messages and
//!   fetched source files
//!
//! ## In-Memory Repositories
//!
//! Lock-guarded `HashMap` storage for tests and local development. They honour
//! the same contracts as the PostgreSQL versions: insert-if-absent,
//! `NotFound` on deleting a missing entity, `order = count + 1` on message
//! append.

pub mod postgres_application;
pub mod postgres_document;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::application::{Application, ApplicationId, GitHubAccountId};
use crate::domain::document::{
    Conversation, ConversationId, Document, DocumentId, Message, MessageId,
};
use crate::domain::machine::{Machine, MachineId};
use crate::domain::repository::{
    ApplicationRepository, ConversationRepository, DocumentRepository, GitHubAccountRepository,
    MachineRepository, MessageRepository, RepositoryError, SourceFileRepository,
    SourceRepoRepository,
};
use crate::domain::source_file::SourceFile;
use crate::domain::source_repo::{
    GitHubAccount, GitHubCredentials, RepositoryAccess, SourceRepo, SourceRepoId,
};

#[derive(Clone, Default)]
pub struct InMemoryApplicationRepository {
    applications: Arc<RwLock<HashMap<ApplicationId, Application>>>,
}

impl InMemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError> {
        let mut applications = self.applications.write();
        if applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict(format!("Application {}", application.id)));
        }
        applications.insert(application.id, application.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.applications.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Application>, RepositoryError> {
        let mut all: Vec<Application> = self.applications.read().values().cloned().collect();
        all.sort_by_key(|a| a.created_at);
        Ok(all)
    }

    async fn delete(&self, id: ApplicationId) -> Result<(), RepositoryError> {
        self.applications
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Application {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGitHubAccountRepository {
    accounts: Arc<RwLock<HashMap<GitHubAccountId, GitHubAccount>>>,
}

impl InMemoryGitHubAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GitHubAccountRepository for InMemoryGitHubAccountRepository {
    async fn save(&self, account: &GitHubAccount) -> Result<(), RepositoryError> {
        self.accounts.write().insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &GitHubAccountId) -> Result<Option<GitHubAccount>, RepositoryError> {
        Ok(self.accounts.read().get(id).cloned())
    }
}

/// Source repositories, joined against a shared account store for
/// [`SourceRepoRepository::find_access`].
#[derive(Clone)]
pub struct InMemorySourceRepoRepository {
    repositories: Arc<RwLock<HashMap<SourceRepoId, SourceRepo>>>,
    accounts: Arc<RwLock<HashMap<GitHubAccountId, GitHubAccount>>>,
}

impl InMemorySourceRepoRepository {
    pub fn new(accounts: &InMemoryGitHubAccountRepository) -> Self {
        Self {
            repositories: Arc::new(RwLock::new(HashMap::new())),
            accounts: accounts.accounts.clone(),
        }
    }
}

#[async_trait]
impl SourceRepoRepository for InMemorySourceRepoRepository {
    async fn insert(&self, repository: &SourceRepo) -> Result<(), RepositoryError> {
        let mut repositories = self.repositories.write();
        if repositories
            .values()
            .any(|r| r.id == repository.id || r.application_id == repository.application_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "Source repository for application {}",
                repository.application_id
            )));
        }
        repositories.insert(repository.id, repository.clone());
        Ok(())
    }

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<SourceRepo>, RepositoryError> {
        Ok(self
            .repositories
            .read()
            .values()
            .find(|r| r.application_id == application_id)
            .cloned())
    }

    async fn find_access(
        &self,
        application_id: ApplicationId,
        fallback: Option<&GitHubCredentials>,
    ) -> Result<Option<RepositoryAccess>, RepositoryError> {
        let Some(repository) = self.find_by_application(application_id).await? else {
            return Ok(None);
        };

        let credentials = match &repository.github_account {
            Some(account_id) => self
                .accounts
                .read()
                .get(account_id)
                .map(|a| a.credentials.clone())
                .ok_or_else(|| RepositoryError::NotFound(format!("GitHub account {}", account_id)))?,
            None => fallback.cloned().ok_or_else(|| {
                RepositoryError::NotFound(format!(
                    "No credentials for repository {}",
                    repository.full_name()
                ))
            })?,
        };

        Ok(Some(RepositoryAccess { repository, credentials }))
    }

    async fn delete(&self, id: SourceRepoId) -> Result<(), RepositoryError> {
        self.repositories
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Source repository {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMachineRepository {
    machines: Arc<RwLock<HashMap<MachineId, Machine>>>,
}

impl InMemoryMachineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MachineRepository for InMemoryMachineRepository {
    async fn insert(&self, machine: &Machine) -> Result<(), RepositoryError> {
        let mut machines = self.machines.write();
        if machines
            .values()
            .any(|m| m.id == machine.id || m.application_id == machine.application_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "Machine for application {}",
                machine.application_id
            )));
        }
        machines.insert(machine.id, machine.clone());
        Ok(())
    }

    async fn save(&self, machine: &Machine) -> Result<(), RepositoryError> {
        let mut machines = self.machines.write();
        match machines.get_mut(&machine.id) {
            Some(existing) => {
                *existing = machine.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("Machine {}", machine.id))),
        }
    }

    async fn find_by_id(&self, id: MachineId) -> Result<Option<Machine>, RepositoryError> {
        Ok(self.machines.read().get(&id).cloned())
    }

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<Machine>, RepositoryError> {
        Ok(self
            .machines
            .read()
            .values()
            .find(|m| m.application_id == application_id)
            .cloned())
    }

    async fn delete(&self, id: MachineId) -> Result<(), RepositoryError> {
        self.machines
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Machine {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentRepository {
    documents: Arc<RwLock<HashMap<DocumentId, Document>>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(&self, document: &Document) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write();
        if documents
            .values()
            .any(|d| d.id == document.id || d.application_id == document.application_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "Document for application {}",
                document.application_id
            )));
        }
        documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn save(&self, document: &Document) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write();
        match documents.get_mut(&document.id) {
            Some(existing) => {
                *existing = document.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("Document {}", document.id))),
        }
    }

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<Document>, RepositoryError> {
        Ok(self
            .documents
            .read()
            .values()
            .find(|d| d.application_id == application_id)
            .cloned())
    }

    async fn delete(&self, id: DocumentId) -> Result<(), RepositoryError> {
        self.documents
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Document {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    conversations: Arc<RwLock<HashMap<ConversationId, Conversation>>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn insert(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write();
        if conversations
            .values()
            .any(|c| c.id == conversation.id || c.document_id == conversation.document_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "Conversation for document {}",
                conversation.document_id
            )));
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write();
        match conversations.get_mut(&conversation.id) {
            Some(existing) => {
                *existing = conversation.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("Conversation {}", conversation.id))),
        }
    }

    async fn find_by_document(&self, document_id: DocumentId) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .conversations
            .read()
            .values()
            .find(|c| c.document_id == document_id)
            .cloned())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        self.conversations
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Conversation {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMessageRepository {
    messages: Arc<RwLock<HashMap<MessageId, Message>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, mut message: Message) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.write();
        if messages.contains_key(&message.id) {
            return Err(RepositoryError::Conflict(format!("Message {}", message.id)));
        }
        let count = messages
            .values()
            .filter(|m| m.conversation_id == message.conversation_id)
            .count() as i64;
        message.order = count + 1;
        messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn save(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write();
        match messages.get_mut(&message.id) {
            Some(existing) => {
                *existing = message.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("Message {}", message.id))),
        }
    }

    async fn list_by_conversation(&self, conversation_id: ConversationId) -> Result<Vec<Message>, RepositoryError> {
        let mut list: Vec<Message> = self
            .messages
            .read()
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        list.sort_by_key(|m| (m.order, m.created_at));
        Ok(list)
    }

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError> {
        self.messages
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Message {}", id)))
    }

    async fn delete_by_conversation(&self, conversation_id: ConversationId) -> Result<(), RepositoryError> {
        self.messages
            .write()
            .retain(|_, m| m.conversation_id != conversation_id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySourceFileRepository {
    files: Arc<RwLock<HashMap<(SourceRepoId, String), SourceFile>>>,
}

impl InMemorySourceFileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceFileRepository for InMemorySourceFileRepository {
    async fn upsert(&self, file: &SourceFile) -> Result<(), RepositoryError> {
        self.files
            .write()
            .insert((file.repository_id, file.path.clone()), file.clone());
        Ok(())
    }

    async fn list_by_repository(&self, repository_id: SourceRepoId) -> Result<Vec<SourceFile>, RepositoryError> {
        let mut files: Vec<SourceFile> = self
            .files
            .read()
            .values()
            .filter(|f| f.repository_id == repository_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn delete_by_repository(&self, repository_id: SourceRepoId) -> Result<(), RepositoryError> {
        self.files.write().retain(|(repo, _), _| *repo != repository_id);
        Ok(())
    }
}
