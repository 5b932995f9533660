// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Document
//!
//! PostgreSQL persistence for documents, conversations, messages and fetched
//! source files. Node collections, conversation stages and import lists are
//! stored as JSONB.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::application::ApplicationId;
use crate::domain::document::{
    Conversation, ConversationId, ConversationStage, Document, DocumentId, Message, MessageId,
    MessageRole,
};
use crate::domain::outline::Node;
use crate::domain::repository::{
    ConversationRepository, DocumentRepository, MessageRepository, RepositoryError,
    SourceFileRepository,
};
use crate::domain::source_file::{SourceFile, SourceFileId};
use crate::domain::source_repo::SourceRepoId;

pub struct PostgresDocumentRepository {
    pool: PgPool,
}

impl PostgresDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PostgresDocumentRepository {
    async fn insert(&self, document: &Document) -> Result<(), RepositoryError> {
        let nodes = serde_json::to_value(&document.nodes)?;
        let result = sqlx::query(
            r#"
            INSERT INTO documents (id, application_id, nodes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(document.id.0)
        .bind(document.application_id.0)
        .bind(nodes)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "Document for application {}",
                document.application_id
            )));
        }
        Ok(())
    }

    async fn save(&self, document: &Document) -> Result<(), RepositoryError> {
        let nodes = serde_json::to_value(&document.nodes)?;
        let result = sqlx::query("UPDATE documents SET nodes = $2, updated_at = $3 WHERE id = $1")
            .bind(document.id.0)
            .bind(nodes)
            .bind(document.updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Document {} not found", document.id)));
        }
        Ok(())
    }

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, application_id, nodes, created_at, updated_at
            FROM documents
            WHERE application_id = $1
            "#,
        )
        .bind(application_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let nodes_val: serde_json::Value = row.get("nodes");
                let nodes: Vec<Node> = serde_json::from_value(nodes_val).map_err(|e| {
                    RepositoryError::Serialization(format!("Failed to deserialize nodes: {}", e))
                })?;
                Ok(Some(Document {
                    id: DocumentId(row.get("id")),
                    application_id: ApplicationId(row.get("application_id")),
                    nodes,
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: DocumentId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Document {} not found", id)));
        }
        Ok(())
    }
}

pub struct PostgresConversationRepository {
    pool: PgPool,
}

impl PostgresConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PostgresConversationRepository {
    async fn insert(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let stage = serde_json::to_value(&conversation.stage)?;
        let result = sqlx::query(
            r#"
            INSERT INTO conversations (id, document_id, stage, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(conversation.id.0)
        .bind(conversation.document_id.0)
        .bind(stage)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "Conversation for document {}",
                conversation.document_id
            )));
        }
        Ok(())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let stage = serde_json::to_value(&conversation.stage)?;
        let result = sqlx::query("UPDATE conversations SET stage = $2, updated_at = $3 WHERE id = $1")
            .bind(conversation.id.0)
            .bind(stage)
            .bind(conversation.updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Conversation {} not found", conversation.id)));
        }
        Ok(())
    }

    async fn find_by_document(&self, document_id: DocumentId) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, document_id, stage, created_at, updated_at
            FROM conversations
            WHERE document_id = $1
            "#,
        )
        .bind(document_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let stage_val: serde_json::Value = row.get("stage");
                let stage: ConversationStage = serde_json::from_value(stage_val).map_err(|e| {
                    RepositoryError::Serialization(format!("Failed to deserialize stage: {}", e))
                })?;
                Ok(Some(Conversation {
                    id: ConversationId(row.get("id")),
                    document_id: DocumentId(row.get("document_id")),
                    stage,
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Conversation {} not found", id)));
        }
        Ok(())
    }
}

pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn append(&self, mut message: Message) -> Result<Message, RepositoryError> {
        // Order is computed inside the INSERT so the count and the write
        // happen in one statement.
        let row = sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, role, content, json_response,
                message_order, context_restarted, created_at
            )
            SELECT $1, $2, $3, $4, $5,
                   (SELECT COUNT(*) FROM messages WHERE conversation_id = $2) + 1,
                   $6, $7
            RETURNING message_order
            "#,
        )
        .bind(message.id.0)
        .bind(message.conversation_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.json_response)
        .bind(message.context_restarted)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await?;

        message.order = row.get("message_order");
        Ok(message)
    }

    async fn save(&self, message: &Message) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET
                content = $2,
                json_response = $3,
                context_restarted = $4
            WHERE id = $1
            "#,
        )
        .bind(message.id.0)
        .bind(&message.content)
        .bind(&message.json_response)
        .bind(message.context_restarted)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Message {} not found", message.id)));
        }
        Ok(())
    }

    async fn list_by_conversation(&self, conversation_id: ConversationId) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, json_response,
                   message_order, context_restarted, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY message_order ASC, created_at ASC
            "#,
        )
        .bind(conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_message_row).collect()
    }

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Message {} not found", id)));
        }
        Ok(())
    }

    async fn delete_by_conversation(&self, conversation_id: ConversationId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(conversation_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_message_row(row: &PgRow) -> Result<Message, RepositoryError> {
    let role_text: String = row.get("role");
    let role = MessageRole::parse(&role_text)
        .ok_or_else(|| RepositoryError::Serialization(format!("Unknown message role: {}", role_text)))?;

    Ok(Message {
        id: MessageId(row.get("id")),
        conversation_id: ConversationId(row.get("conversation_id")),
        role,
        content: row.get("content"),
        json_response: row.get("json_response"),
        order: row.get("message_order"),
        context_restarted: row.get("context_restarted"),
        created_at: row.get("created_at"),
    })
}

pub struct PostgresSourceFileRepository {
    pool: PgPool,
}

impl PostgresSourceFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceFileRepository for PostgresSourceFileRepository {
    async fn upsert(&self, file: &SourceFile) -> Result<(), RepositoryError> {
        let imports = serde_json::to_value(&file.imports)?;
        sqlx::query(
            r#"
            INSERT INTO source_files (id, repository_id, path, content, imports, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (repository_id, path) DO UPDATE SET
                content = EXCLUDED.content,
                imports = EXCLUDED.imports,
                fetched_at = EXCLUDED.fetched_at
            "#,
        )
        .bind(file.id.0)
        .bind(file.repository_id.0)
        .bind(&file.path)
        .bind(&file.content)
        .bind(imports)
        .bind(file.fetched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_repository(&self, repository_id: SourceRepoId) -> Result<Vec<SourceFile>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, repository_id, path, content, imports, fetched_at
            FROM source_files
            WHERE repository_id = $1
            ORDER BY path ASC
            "#,
        )
        .bind(repository_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let imports_val: serde_json::Value = row.get("imports");
                let imports: Vec<String> = serde_json::from_value(imports_val)?;
                Ok(SourceFile {
                    id: SourceFileId(row.get("id")),
                    repository_id: SourceRepoId(row.get("repository_id")),
                    path: row.get("path"),
                    content: row.get("content"),
                    imports,
                    fetched_at: row.get("fetched_at"),
                })
            })
            .collect()
    }

    async fn delete_by_repository(&self, repository_id: SourceRepoId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM source_files WHERE repository_id = $1")
            .bind(repository_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
