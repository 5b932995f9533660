// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Outline Generation
//!
//! Structured-output calls to the language model that produce outline
//! nodes: from a free-text prompt, from source files in dependency order,
//! and for one turn of the guided conversation. Responses are validated
//! against the node shape before they leave this module; retries belong to
//! the provider registry.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::document::{ConversationStage, StageError, StageResponse};
use crate::domain::llm::{ChatMessage, GenerationRequest, LLMError, LLMProvider};
use crate::domain::outline::{build_numbered_outline, max_numeric_id, nodes_from_value, Node};
use crate::domain::source_file::SourceFile;

const OUTLINE_INSTRUCTION: &str = "You turn descriptions into a hierarchical outline. \
Respond with JSON only: an object with a \"nodes\" array. Each node has a string \"id\", \
a string \"parentId\" (\"\" for top-level nodes) and a string \"label\". Ids are positive \
integers written as strings. Parents must appear before their children.";

const CODE_INSTRUCTION: &str = "You describe the structure of a code base as a hierarchical \
outline. Files are given in dependency order: each file only depends on files listed before it. \
Produce one node per meaningful module, component, page or function, nested under the file or \
feature it belongs to. Respond with JSON only: an object with a \"nodes\" array of \
{\"id\", \"parentId\", \"label\"} string fields, \"\" as parentId for top-level nodes.";

const CONVERSATION_INSTRUCTION: &str = "You guide a user from an application idea to a detailed \
feature outline in stages: concept, features, details, complete. Ask one focused question at a \
time in \"message\". Set \"shouldProceedToFeatures\" once the concept is clear, \
\"shouldProceedToDetails\" once the feature list is agreed, and \"isComplete\" when the user \
accepts the detailed outline. Whenever you proceed to details or complete, include the full \
outline in \"nodes\".";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generated output has the wrong shape: {0}")]
    Format(String),

    #[error(transparent)]
    MissingNodes(#[from] StageError),

    #[error(transparent)]
    Provider(#[from] LLMError),
}

fn node_item_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "parentId": { "type": "string" },
            "label": { "type": "string" },
            "collapsed": { "type": "boolean" }
        },
        "required": ["id", "parentId", "label"]
    })
}

/// Response schema for node generation.
pub fn nodes_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "nodes": { "type": "array", "items": node_item_schema() }
        },
        "required": ["nodes"]
    })
}

/// Response schema for one conversation turn.
pub fn stage_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message": { "type": "string" },
            "shouldProceedToFeatures": { "type": "boolean" },
            "shouldProceedToDetails": { "type": "boolean" },
            "isComplete": { "type": "boolean" },
            "nodes": { "type": "array", "items": node_item_schema() }
        },
        "required": ["message"]
    })
}

/// JSON text inside a fenced code block, preferring a ```json fence.
pub fn extract_json(text: &str) -> Option<String> {
    let start_marker = "```json";
    if let Some(start) = text.find(start_marker) {
        let content_start = start + start_marker.len();
        if let Some(end_offset) = text[content_start..].find("```") {
            let content_end = content_start + end_offset;
            return Some(text[content_start..content_end].trim().to_string());
        }
    }

    let generic_marker = "```";
    if let Some(start) = text.find(generic_marker) {
        let content_start = start + generic_marker.len();
        if let Some(end_offset) = text[content_start..].find("```") {
            let content_end = content_start + end_offset;
            return Some(text[content_start..content_end].trim().to_string());
        }
    }

    None
}

fn parse_json(text: &str) -> Result<Value, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::Format("empty response".to_string()));
    }
    let body = extract_json(trimmed).unwrap_or_else(|| trimmed.to_string());
    serde_json::from_str(&body).map_err(|e| GenerationError::Format(format!("not valid JSON: {}", e)))
}

/// Validate a `{"nodes": [...]}` response.
pub fn parse_nodes_response(text: &str) -> Result<Vec<Node>, GenerationError> {
    let value = parse_json(text)?;
    let nodes = value
        .get("nodes")
        .ok_or_else(|| GenerationError::Format("missing \"nodes\" array".to_string()))?;
    nodes_from_value(nodes).map_err(|e| GenerationError::Format(e.to_string()))
}

/// Validate a conversation-turn response. Nodes, when present, must have the
/// node shape.
pub fn parse_stage_response(text: &str) -> Result<StageResponse, GenerationError> {
    let value = parse_json(text)?;
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| GenerationError::Format("missing string field \"message\"".to_string()))?;
    let flag = |name: &str| value.get(name).and_then(Value::as_bool).unwrap_or(false);

    let nodes = match value.get("nodes") {
        None | Some(Value::Null) => None,
        Some(nodes) => Some(nodes_from_value(nodes).map_err(|e| GenerationError::Format(e.to_string()))?),
    };

    Ok(StageResponse {
        message: message.to_string(),
        should_proceed_to_features: flag("shouldProceedToFeatures"),
        should_proceed_to_details: flag("shouldProceedToDetails"),
        is_complete: flag("isComplete"),
        nodes,
    })
}

/// Context block telling the model which nodes exist and where new ids start.
fn existing_context(existing: &[Node]) -> Option<String> {
    if existing.is_empty() {
        return None;
    }
    let nodes_json = serde_json::to_string(&json!({ "nodes": existing })).unwrap_or_default();
    Some(format!(
        "The outline already contains these nodes:\n{}\n\nAs JSON:\n{}\n\n\
         Return ONLY new nodes. Number them starting at {}. New nodes may use the ids \
         above as parentId to attach beneath existing nodes.",
        build_numbered_outline(existing),
        nodes_json,
        max_numeric_id(existing) + 1
    ))
}

pub struct OutlineGenerator {
    llm: Arc<dyn LLMProvider>,
}

impl OutlineGenerator {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }

    async fn call(&self, system: &str, messages: Vec<ChatMessage>, schema: Value) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            system_instruction: system.to_string(),
            messages,
            response_schema: Some(schema),
            ..Default::default()
        };
        let response = self.llm.generate(&request).await?;
        debug!(
            provider = %response.provider,
            model = %response.model,
            tokens = response.usage.total_tokens,
            "Generation complete"
        );
        Ok(response.text)
    }

    /// Nodes for `prompt`. With existing nodes, only new nodes are requested.
    pub async fn generate(&self, prompt: &str, existing: &[Node]) -> Result<Vec<Node>, GenerationError> {
        let mut messages = Vec::new();
        if let Some(context) = existing_context(existing) {
            messages.push(ChatMessage::user(context));
        }
        messages.push(ChatMessage::user(prompt));

        let text = self.call(OUTLINE_INSTRUCTION, messages, nodes_schema()).await?;
        let nodes = parse_nodes_response(&text)?;
        info!("Generated {} outline nodes", nodes.len());
        Ok(nodes)
    }

    /// Nodes describing `files`, which must already be in processing order.
    /// All files go into a single call.
    pub async fn generate_from_files(&self, files: &[SourceFile], existing: &[Node]) -> Result<Vec<Node>, GenerationError> {
        let mut listing = String::new();
        for file in files {
            listing.push_str(&format!("File: {}\n```\n{}\n```\n\n", file.path, file.content.trim_end()));
        }

        let mut messages = Vec::new();
        if let Some(context) = existing_context(existing) {
            messages.push(ChatMessage::user(context));
        }
        messages.push(ChatMessage::user(format!(
            "Outline the following {} files:\n\n{}",
            files.len(),
            listing
        )));

        let text = self.call(CODE_INSTRUCTION, messages, nodes_schema()).await?;
        let nodes = parse_nodes_response(&text)?;
        info!("Generated {} outline nodes from {} files", nodes.len(), files.len());
        Ok(nodes)
    }

    /// One conversational turn at `stage`, given the active history ending
    /// with the user's latest message.
    pub async fn converse(
        &self,
        stage: &ConversationStage,
        history: Vec<ChatMessage>,
        existing: &[Node],
    ) -> Result<StageResponse, GenerationError> {
        let mut system = format!("{}\n\nCurrent stage: {}.", CONVERSATION_INSTRUCTION, stage.name());
        let current = stage.nodes().unwrap_or(existing);
        if !current.is_empty() {
            system.push_str(&format!("\n\nCurrent outline:\n{}", build_numbered_outline(current)));
        }

        let text = self.call(&system, history, stage_schema()).await?;
        parse_stage_response(&text)
    }
}
