// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::collections::HashMap;

use common::{node, MockGitHub, ScriptedLlm, World};
use devspace_core::application::{GenerationError, RepositoryOutlineRequest};
use devspace_core::domain::application::ApplicationId;
use devspace_core::domain::document::ConversationStage;
use devspace_core::domain::llm::ChatRole;
use devspace_core::domain::outline::MergeMode;
use devspace_core::domain::source_repo::{ContentEntry, EntryKind};

async fn world_with_document(llm: ScriptedLlm) -> (World, ApplicationId) {
    let world = World::with(MockGitHub::default(), llm);
    let application = world.orchestrator.create_application("Planner", None, None).await.unwrap();
    world.documents.create_for_application(application.id).await.unwrap();
    (world, application.id)
}

#[tokio::test]
async fn test_generated_nodes_continue_existing_ids() {
    let (world, app_id) = world_with_document(ScriptedLlm::new(&[
        r#"{"nodes":[{"id":"1","parentId":"","label":"Billing"},{"id":"2","parentId":"1","label":"Invoices"}]}"#,
    ]))
    .await;
    let existing = vec![node("1", "", "Home"), node("2", "1", "Feed"), node("3", "", "Settings")];
    world
        .documents
        .update_nodes(app_id, existing.clone(), MergeMode::Replace)
        .await
        .unwrap();

    let document = world
        .documents
        .generate_outline(app_id, "add billing", MergeMode::Extend)
        .await
        .unwrap();

    assert_eq!(&document.nodes[..3], existing.as_slice());
    assert_eq!(document.nodes[3].id, "4");
    assert_eq!(document.nodes[4].id, "5");
    assert_eq!(document.nodes[4].parent_id, "4");

    let request = world.llm.requests.lock()[0].clone();
    assert!(request.messages[0].content.contains("starting at 4"));
}

#[tokio::test]
async fn test_malformed_generation_leaves_document_unchanged() {
    let (world, app_id) = world_with_document(ScriptedLlm::new(&["I could not do that."])).await;
    world
        .documents
        .update_nodes(app_id, vec![node("1", "", "Home")], MergeMode::Replace)
        .await
        .unwrap();

    let err = world
        .documents
        .generate_outline(app_id, "anything", MergeMode::Extend)
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<GenerationError>(), Some(GenerationError::Format(_))));
    assert_eq!(world.documents.document(app_id).await.unwrap().nodes.len(), 1);
}

#[tokio::test]
async fn test_conversation_walks_through_stages() {
    let details = r#"{"message":"Here is a draft","shouldProceedToDetails":true,
        "nodes":[{"id":"1","parentId":"","label":"Recipes"},{"id":"2","parentId":"1","label":"Search"}]}"#;
    let (world, app_id) = world_with_document(ScriptedLlm::new(&[
        r#"{"message":"What should it do?","shouldProceedToFeatures":true}"#,
        details,
        r#"{"message":"Done","isComplete":true}"#,
        r#"{"message":"Done","isComplete":true,"nodes":[{"id":"1","parentId":"","label":"Recipes"}]}"#,
    ]))
    .await;

    let turn = world.documents.send_message(app_id, "A recipe app", false).await.unwrap();
    assert_eq!(turn.conversation.stage, ConversationStage::Features);

    let turn = world.documents.send_message(app_id, "Search and tags", false).await.unwrap();
    assert_eq!(turn.conversation.stage.name(), "details");
    let document = world.documents.document(app_id).await.unwrap();
    assert_eq!(document.nodes.len(), 2);

    // Completing without nodes is refused and the stage stays put
    let err = world.documents.send_message(app_id, "Looks good", false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GenerationError>(),
        Some(GenerationError::MissingNodes(_))
    ));

    let turn = world.documents.send_message(app_id, "Ship it", false).await.unwrap();
    assert_eq!(turn.conversation.stage.name(), "complete");
    assert_eq!(world.documents.document(app_id).await.unwrap().nodes.len(), 1);
    assert!(turn.assistant_message.json_response.is_some());
}

#[tokio::test]
async fn test_restart_context_drops_earlier_history() {
    let reply = r#"{"message":"ok"}"#;
    let (world, app_id) = world_with_document(ScriptedLlm::new(&[reply, reply, reply])).await;

    world.documents.send_message(app_id, "first", false).await.unwrap();
    world.documents.send_message(app_id, "second", false).await.unwrap();
    assert_eq!(world.llm.requests.lock()[1].messages.len(), 3);

    let turn = world.documents.send_message(app_id, "fresh start", true).await.unwrap();
    assert!(turn.user_message.context_restarted);

    let request = world.llm.requests.lock()[2].clone();
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, ChatRole::User);
    assert_eq!(request.messages[0].content, "fresh start");

    // Earlier messages remain stored
    assert_eq!(world.documents.list_messages(app_id).await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_deleting_a_message_keeps_order_gaps() {
    let reply = r#"{"message":"ok"}"#;
    let (world, app_id) = world_with_document(ScriptedLlm::new(&[reply, reply])).await;
    world.documents.send_message(app_id, "one", false).await.unwrap();
    let turn = world.documents.send_message(app_id, "two", false).await.unwrap();

    world.documents.delete_message(turn.user_message.id).await.unwrap();

    let orders: Vec<i64> = world
        .documents
        .list_messages(app_id)
        .await
        .unwrap()
        .iter()
        .map(|m| m.order)
        .collect();
    assert_eq!(orders, vec![1, 2, 4]);
}

#[tokio::test]
async fn test_repository_outline_sends_dependencies_first() {
    let file = |path: &str| ContentEntry {
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: path.to_string(),
        kind: EntryKind::File,
    };
    let dir = |path: &str| ContentEntry {
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: path.to_string(),
        kind: EntryKind::Dir,
    };

    let mut directories = HashMap::new();
    directories.insert(String::new(), vec![dir("src"), file("README.md")]);
    directories.insert("src".to_string(), vec![dir("src/app"), dir("src/lib")]);
    directories.insert("src/app".to_string(), vec![file("src/app/page.tsx")]);
    directories.insert("src/lib".to_string(), vec![file("src/lib/db.ts"), file("src/lib/unused.ts")]);

    let mut files = HashMap::new();
    files.insert(
        "src/app/page.tsx".to_string(),
        "import { db } from '@/lib/db';\nexport default function Page() {}".to_string(),
    );
    files.insert("src/lib/db.ts".to_string(), "export const db = {};".to_string());
    files.insert("src/lib/unused.ts".to_string(), "export {};".to_string());

    let github = MockGitHub {
        directories,
        files,
        ..Default::default()
    };
    let llm = ScriptedLlm::new(&[r#"{"nodes":[{"id":"1","parentId":"","label":"Page"}]}"#]);
    let world = World::with(github, llm);
    let report = world.orchestrator.create_and_provision("Planner", None, None).await.unwrap();
    let app_id = report.application.id;

    let request = RepositoryOutlineRequest {
        pattern: "src/app".to_string(),
        dependency_pattern: "src/".to_string(),
        max_depth: 5,
    };
    let document = world.orchestrator.outline_from_repository(app_id, &request).await.unwrap();
    assert_eq!(document.nodes.len(), 1);

    let prompt = world.llm.requests.lock()[0].messages.last().unwrap().content.clone();
    let db = prompt.find("File: src/lib/db.ts").unwrap();
    let page = prompt.find("File: src/app/page.tsx").unwrap();
    assert!(db < page);
    assert!(!prompt.contains("unused.ts"));

    let cached = world
        .repositories
        .source_files
        .list_by_repository(report.repository.id)
        .await
        .unwrap();
    assert_eq!(cached.len(), 2);
}
