// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Document Service
//!
//! Persists outline edits, runs outline generation (from prompts and from a
//! repository's source files) and drives the guided conversation.
//!
//! Structural edits load the document, apply a pure function from
//! [`crate::domain::outline`] and save the result. Expand/collapse by level
//! only return a view; [`DocumentService::save_view`] persists one.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::application::outline_generation::{GenerationError, OutlineGenerator};
use crate::application::repository_factory::Repositories;
use crate::application::source_provisioner::SourceRepositoryProvisioner;
use crate::domain::application::ApplicationId;
use crate::domain::document::{active_context, Conversation, Document, Message, MessageId, MessageRole};
use crate::domain::events::DocumentEvent;
use crate::domain::llm::ChatMessage;
use crate::domain::outline::{self, MergeMode, Node, OutlineError};
use crate::domain::repository::{
    ConversationRepository, DocumentRepository, MessageRepository, RepositoryError, SourceFileRepository,
};
use crate::domain::source_repo::RepositoryAccess;
use crate::infrastructure::event_bus::EventBus;

/// Result of one conversational turn.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub user_message: Message,
    pub assistant_message: Message,
    pub conversation: Conversation,
}

/// What to pull from a repository when outlining it.
#[derive(Debug, Clone)]
pub struct RepositoryOutlineRequest {
    /// Substring selecting the seed files, e.g. `src/app`.
    pub pattern: String,
    /// Substring a discovered import must contain to be followed.
    pub dependency_pattern: String,
    pub max_depth: usize,
}

pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    source_files: Arc<dyn SourceFileRepository>,
    generator: Arc<OutlineGenerator>,
    sources: Option<Arc<SourceRepositoryProvisioner>>,
    event_bus: Arc<EventBus>,
}

impl DocumentService {
    pub fn new(repositories: &Repositories, generator: Arc<OutlineGenerator>, event_bus: Arc<EventBus>) -> Self {
        Self {
            documents: repositories.documents.clone(),
            conversations: repositories.conversations.clone(),
            messages: repositories.messages.clone(),
            source_files: repositories.source_files.clone(),
            generator,
            sources: None,
            event_bus,
        }
    }

    pub fn with_source_provisioner(mut self, sources: Arc<SourceRepositoryProvisioner>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Create the empty document and conversation for an application. An
    /// existing document is kept.
    pub async fn create_for_application(&self, application_id: ApplicationId) -> Result<(Document, Conversation)> {
        let document = match self.documents.insert(&Document::new(application_id)).await {
            Ok(()) | Err(RepositoryError::Conflict(_)) => self.document(application_id).await?,
            Err(e) => return Err(e).context("Failed to create document"),
        };

        let conversation = match self.conversations.find_by_document(document.id).await? {
            Some(conversation) => conversation,
            None => {
                let conversation = Conversation::new(document.id);
                self.conversations
                    .insert(&conversation)
                    .await
                    .context("Failed to create conversation")?;
                conversation
            }
        };

        Ok((document, conversation))
    }

    /// Remove the document, its conversation and messages.
    pub async fn delete_for_application(&self, application_id: ApplicationId) -> Result<()> {
        let Some(document) = self.documents.find_by_application(application_id).await? else {
            return Ok(());
        };
        if let Some(conversation) = self.conversations.find_by_document(document.id).await? {
            self.messages.delete_by_conversation(conversation.id).await?;
            self.conversations.delete(conversation.id).await?;
        }
        self.documents.delete(document.id).await?;
        Ok(())
    }

    pub async fn find_document(&self, application_id: ApplicationId) -> Result<Option<Document>> {
        Ok(self.documents.find_by_application(application_id).await?)
    }

    pub async fn document(&self, application_id: ApplicationId) -> Result<Document> {
        self.documents
            .find_by_application(application_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Document for application {}", application_id)).into())
    }

    async fn store(&self, mut document: Document, nodes: Vec<Node>) -> Result<Document> {
        outline::validate_acyclic(&nodes)?;
        document.set_nodes(nodes);
        self.documents.save(&document).await.context("Failed to save document")?;

        self.event_bus.publish_document_event(DocumentEvent::OutlineUpdated {
            application_id: document.application_id,
            document_id: document.id,
            node_count: document.nodes.len(),
            updated_at: Utc::now(),
        });
        Ok(document)
    }

    async fn edit<F>(&self, application_id: ApplicationId, edit: F) -> Result<Document>
    where
        F: FnOnce(&[Node]) -> Result<Vec<Node>, OutlineError>,
    {
        let document = self.document(application_id).await?;
        let nodes = edit(&document.nodes)?;
        self.store(document, nodes).await
    }

    /// Replace or extend the stored nodes.
    pub async fn update_nodes(&self, application_id: ApplicationId, incoming: Vec<Node>, mode: MergeMode) -> Result<Document> {
        self.edit(application_id, |existing| Ok(outline::merge(existing, &incoming, mode)))
            .await
    }

    pub async fn import_json(&self, application_id: ApplicationId, text: &str, mode: MergeMode) -> Result<Document> {
        let incoming = outline::import_json(text)?;
        self.update_nodes(application_id, incoming, mode).await
    }

    pub async fn export_json(&self, application_id: ApplicationId) -> Result<String> {
        let document = self.document(application_id).await?;
        Ok(outline::export_json(&document.nodes)?)
    }

    pub async fn numbered_outline(&self, application_id: ApplicationId) -> Result<String> {
        let document = self.document(application_id).await?;
        Ok(outline::build_numbered_outline(&document.nodes))
    }

    pub async fn indent(&self, application_id: ApplicationId, node_id: &str) -> Result<Document> {
        self.edit(application_id, |nodes| outline::indent(node_id, nodes)).await
    }

    pub async fn outdent(&self, application_id: ApplicationId, node_id: &str) -> Result<Document> {
        self.edit(application_id, |nodes| outline::outdent(node_id, nodes)).await
    }

    pub async fn rename(&self, application_id: ApplicationId, node_id: &str, label: &str) -> Result<Document> {
        self.edit(application_id, |nodes| outline::rename(node_id, label, nodes)).await
    }

    /// Add a child under `parent_id`; returns the document and the new id.
    pub async fn add_child(&self, application_id: ApplicationId, parent_id: &str, label: &str) -> Result<(Document, String)> {
        let document = self.document(application_id).await?;
        let (nodes, id) = outline::add_child(parent_id, label, &document.nodes)?;
        Ok((self.store(document, nodes).await?, id))
    }

    pub async fn add_sibling(&self, application_id: ApplicationId, sibling_id: &str, label: &str) -> Result<(Document, String)> {
        let document = self.document(application_id).await?;
        let (nodes, id) = outline::add_sibling(sibling_id, label, &document.nodes)?;
        Ok((self.store(document, nodes).await?, id))
    }

    pub async fn remove_subtree(&self, application_id: ApplicationId, node_id: &str) -> Result<Document> {
        self.edit(application_id, |nodes| outline::remove_subtree(node_id, nodes)).await
    }

    /// Expanded view; not persisted.
    pub async fn expand_to_level(&self, application_id: ApplicationId, level: usize) -> Result<Vec<Node>> {
        let document = self.document(application_id).await?;
        Ok(outline::expand_to_level(level, &document.nodes)?)
    }

    /// Collapsed view; not persisted.
    pub async fn collapse_to_level(&self, application_id: ApplicationId, level: usize) -> Result<Vec<Node>> {
        let document = self.document(application_id).await?;
        Ok(outline::collapse_to_level(level, &document.nodes)?)
    }

    /// Persist a view returned by expand/collapse.
    pub async fn save_view(&self, application_id: ApplicationId, nodes: Vec<Node>) -> Result<Document> {
        self.update_nodes(application_id, nodes, MergeMode::Replace).await
    }

    /// Generate nodes from `prompt` and merge them into the outline.
    pub async fn generate_outline(&self, application_id: ApplicationId, prompt: &str, mode: MergeMode) -> Result<Document> {
        let document = self.document(application_id).await?;
        let context: &[Node] = match mode {
            MergeMode::Extend => &document.nodes,
            MergeMode::Replace => &[],
        };

        let generated = self.generator.generate(prompt, context).await?;
        metrics::counter!("devspace_outline_generations_total", "mode" => mode_label(mode)).increment(1);

        let nodes = outline::merge(&document.nodes, &generated, mode);
        self.store(document, nodes).await
    }

    /// Outline a repository's code: fetch the files matching the request and
    /// their in-repository imports, cache them in processing order and extend
    /// the outline from one generation call.
    pub async fn generate_from_repository(
        &self,
        application_id: ApplicationId,
        access: &RepositoryAccess,
        request: &RepositoryOutlineRequest,
    ) -> Result<Document> {
        let sources = self
            .sources
            .as_ref()
            .context("Repository outlining requires a source provisioner")?;
        let repository = &access.repository;
        let credentials = &access.credentials;

        let paths = sources
            .list_file_paths(&repository.owner, &repository.name, credentials)
            .await
            .with_context(|| format!("Failed to list files of {}", repository.full_name()))?;
        let seed = sources
            .fetch_matching_files(&repository.owner, &repository.name, &paths, &request.pattern, credentials)
            .await;
        if seed.is_empty() {
            anyhow::bail!("No files in {} match '{}'", repository.full_name(), request.pattern);
        }

        let closure = sources
            .collect_dependency_closure(
                &repository.owner,
                &repository.name,
                seed,
                &paths,
                &request.dependency_pattern,
                request.max_depth,
                credentials,
            )
            .await;
        let ordered = sources.processing_order(repository.id, closure, &paths);

        for file in &ordered {
            if let Err(e) = self.source_files.upsert(file).await {
                warn!("Failed to cache {}: {}", file.path, e);
            }
        }
        info!(
            application_id = %application_id,
            files = ordered.len(),
            "Outlining repository {}",
            repository.full_name()
        );

        let document = self.document(application_id).await?;
        let generated = self.generator.generate_from_files(&ordered, &document.nodes).await?;
        metrics::counter!("devspace_outline_generations_total", "mode" => "repository").increment(1);

        let nodes = outline::merge(&document.nodes, &generated, MergeMode::Extend);
        self.store(document, nodes).await
    }

    async fn conversation(&self, application_id: ApplicationId) -> Result<(Document, Conversation)> {
        let document = self.document(application_id).await?;
        let conversation = self
            .conversations
            .find_by_document(document.id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Conversation for document {}", document.id)))?;
        Ok((document, conversation))
    }

    pub async fn list_messages(&self, application_id: ApplicationId) -> Result<Vec<Message>> {
        let (_, conversation) = self.conversation(application_id).await?;
        Ok(self.messages.list_by_conversation(conversation.id).await?)
    }

    /// Delete one message. Later messages keep their order values.
    pub async fn delete_message(&self, message_id: MessageId) -> Result<()> {
        self.messages.delete(message_id).await?;
        Ok(())
    }

    /// Send a user message and record the model's reply.
    ///
    /// With `restart_context` the message starts a fresh context: earlier
    /// messages stay stored but are no longer sent to the model. When the
    /// reply would enter `details` or `complete` without nodes the stage is
    /// left unchanged and [`GenerationError::MissingNodes`] is returned.
    pub async fn send_message(
        &self,
        application_id: ApplicationId,
        content: &str,
        restart_context: bool,
    ) -> Result<ConversationTurn> {
        let (document, mut conversation) = self.conversation(application_id).await?;

        let mut user_message = Message::new(conversation.id, MessageRole::User, content);
        user_message.context_restarted = restart_context;
        let user_message = self.messages.append(user_message).await?;
        if restart_context {
            self.event_bus.publish_document_event(DocumentEvent::ContextRestarted {
                conversation_id: conversation.id,
                restarted_at: Utc::now(),
            });
        }

        let history = self.messages.list_by_conversation(conversation.id).await?;
        let chat: Vec<ChatMessage> = active_context(&history)
            .into_iter()
            .map(|m| match m.role {
                MessageRole::User => ChatMessage::user(m.content.clone()),
                MessageRole::Assistant => ChatMessage::assistant(m.content.clone()),
            })
            .collect();

        let response = self
            .generator
            .converse(&conversation.stage, chat, &document.nodes)
            .await?;
        let next_stage = conversation
            .stage
            .advance(&response)
            .map_err(GenerationError::from)?;

        let assistant_message = Message::new(conversation.id, MessageRole::Assistant, response.message.clone())
            .with_json_response(serde_json::to_value(&response)?);
        let assistant_message = self.messages.append(assistant_message).await?;

        let from = conversation.stage.name();
        let stage_changed = next_stage != conversation.stage;
        if stage_changed {
            let to = next_stage.name();
            info!(conversation_id = %conversation.id, from, to, "Conversation stage advanced");
            self.event_bus.publish_document_event(DocumentEvent::StageAdvanced {
                conversation_id: conversation.id,
                from: from.to_string(),
                to: to.to_string(),
                advanced_at: Utc::now(),
            });
        }

        if stage_changed {
            if let Some(nodes) = next_stage.nodes() {
                self.store(document, nodes.to_vec()).await?;
            }
        }

        conversation.set_stage(next_stage);
        self.conversations.save(&conversation).await?;

        Ok(ConversationTurn {
            user_message,
            assistant_message,
            conversation,
        })
    }
}

fn mode_label(mode: MergeMode) -> &'static str {
    match mode {
        MergeMode::Replace => "replace",
        MergeMode::Extend => "extend",
    }
}
