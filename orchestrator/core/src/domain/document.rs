// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Document and Conversation Aggregates
//!
//! Each application owns one [`Document`] (its outline) and, through it, one
//! [`Conversation`] that walks the user from a rough concept to a detailed
//! outline. The conversation's [`ConversationStage`] is a tagged enum; the
//! stages that carry an outline hold their nodes inline so that a stage can
//! never claim to be "details" without having any.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::application::ApplicationId;
use crate::domain::outline::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The outline belonging to one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub application_id: ApplicationId,
    pub nodes: Vec<Node>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(application_id: ApplicationId) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            application_id,
            nodes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_nodes(&mut self, nodes: Vec<Node>) {
        self.nodes = nodes;
        self.updated_at = Utc::now();
    }
}

/// Where the guided conversation currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum ConversationStage {
    #[default]
    Concept,
    Features,
    Details { nodes: Vec<Node> },
    Complete { nodes: Vec<Node> },
}

impl ConversationStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Features => "features",
            Self::Details { .. } => "details",
            Self::Complete { .. } => "complete",
        }
    }

    pub fn nodes(&self) -> Option<&[Node]> {
        match self {
            Self::Details { nodes } | Self::Complete { nodes } => Some(nodes),
            _ => None,
        }
    }

    /// Next stage given the model's structured reply.
    ///
    /// Entering `details` or `complete` requires a non-empty node list. While
    /// in `details`, a reply that carries nodes without completing refreshes
    /// the carried outline. `complete` is terminal.
    pub fn advance(&self, response: &StageResponse) -> Result<ConversationStage, StageError> {
        let carried_nodes = || -> Result<Vec<Node>, StageError> {
            match &response.nodes {
                Some(nodes) if !nodes.is_empty() => Ok(nodes.clone()),
                _ => Err(StageError::MissingNodes {
                    from: self.name(),
                }),
            }
        };

        match self {
            Self::Concept if response.should_proceed_to_features => Ok(Self::Features),
            Self::Concept => Ok(Self::Concept),
            Self::Features if response.should_proceed_to_details => Ok(Self::Details {
                nodes: carried_nodes()?,
            }),
            Self::Features => Ok(Self::Features),
            Self::Details { .. } if response.is_complete => Ok(Self::Complete {
                nodes: carried_nodes()?,
            }),
            Self::Details { nodes } => match &response.nodes {
                Some(updated) if !updated.is_empty() => Ok(Self::Details { nodes: updated.clone() }),
                _ => Ok(Self::Details { nodes: nodes.clone() }),
            },
            Self::Complete { nodes } => Ok(Self::Complete { nodes: nodes.clone() }),
        }
    }
}

/// Structured reply the model returns for one conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StageResponse {
    pub message: String,
    #[serde(default)]
    pub should_proceed_to_features: bool,
    #[serde(default)]
    pub should_proceed_to_details: bool,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Node>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("Cannot advance from {from} stage without outline nodes")]
    MissingNodes { from: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Guided conversation attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub document_id: DocumentId,
    pub stage: ConversationStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(document_id: DocumentId) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            document_id,
            stage: ConversationStage::Concept,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_stage(&mut self, stage: ConversationStage) {
        self.stage = stage;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    /// Structured reply captured for assistant turns.
    pub json_response: Option<serde_json::Value>,
    /// Position within the conversation, starting at 1. Deleting a message
    /// leaves a gap.
    pub order: i64,
    /// Messages before the latest restart marker are not sent back to the
    /// model.
    pub context_restarted: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: ConversationId, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            role,
            content: content.into(),
            json_response: None,
            order: 0,
            context_restarted: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_json_response(mut self, value: serde_json::Value) -> Self {
        self.json_response = Some(value);
        self
    }
}

/// Messages that form the model's context: everything from the latest
/// restart marker onwards, in order.
pub fn active_context(messages: &[Message]) -> Vec<&Message> {
    let mut sorted: Vec<&Message> = messages.iter().collect();
    sorted.sort_by_key(|m| m.order);
    let start = sorted
        .iter()
        .rposition(|m| m.context_restarted)
        .unwrap_or(0);
    sorted.into_iter().skip(start).collect()
}
