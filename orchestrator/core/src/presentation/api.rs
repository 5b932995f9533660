// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP action API
//!
//! Every route answers with an [`ActionResult`] envelope. Errors from the
//! application layer are mapped to status codes here and nowhere else.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::application::document_service::{DocumentService, RepositoryOutlineRequest};
use crate::application::environment::EnvironmentError;
use crate::application::orchestrator::{ApplicationOrchestrator, OrchestrationError};
use crate::application::outline_generation::GenerationError;
use crate::domain::application::{ApplicationId, GitHubAccountId, UserId};
use crate::domain::compute::ComputeError;
use crate::domain::dns::DnsError;
use crate::domain::document::{Document, MessageId, StageError};
use crate::domain::llm::LLMError;
use crate::domain::machine::MachineError;
use crate::domain::outline::{MergeMode, Node, OutlineError};
use crate::domain::repository::RepositoryError;
use crate::domain::source_repo::SourceControlError;

/// Response envelope shared by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

pub struct AppState {
    pub orchestrator: Arc<ApplicationOrchestrator>,
    pub documents: Arc<DocumentService>,
}

pub fn app(orchestrator: Arc<ApplicationOrchestrator>) -> Router {
    let state = Arc::new(AppState {
        documents: orchestrator.documents().clone(),
        orchestrator,
    });

    Router::new()
        .route("/health", get(health))
        .route("/applications", get(list_applications).post(create_application))
        .route("/applications/{id}", get(application_status).delete(teardown))
        .route("/applications/{id}/provision", post(provision))
        .route("/applications/{id}/suspend", post(suspend))
        .route("/applications/{id}/resume", post(resume))
        .route("/applications/{id}/redeploy", post(redeploy))
        .route("/applications/{id}/env", put(set_env_var))
        .route("/applications/{id}/certificate/renew", post(renew_certificate))
        .route("/applications/{id}/outline", get(get_outline).put(update_outline))
        .route("/applications/{id}/outline/import", post(import_outline))
        .route("/applications/{id}/outline/export", get(export_outline))
        .route("/applications/{id}/outline/numbered", get(numbered_outline))
        .route("/applications/{id}/outline/generate", post(generate_outline))
        .route("/applications/{id}/outline/from-repository", post(outline_from_repository))
        .route("/applications/{id}/outline/expand", get(expand_outline))
        .route("/applications/{id}/outline/collapse", get(collapse_outline))
        .route("/applications/{id}/outline/view", put(save_view))
        .route(
            "/applications/{id}/outline/nodes/{node_id}",
            put(rename_node).delete(remove_node),
        )
        .route("/applications/{id}/outline/nodes/{node_id}/indent", post(indent_node))
        .route("/applications/{id}/outline/nodes/{node_id}/outdent", post(outdent_node))
        .route("/applications/{id}/outline/nodes/{node_id}/children", post(add_child))
        .route("/applications/{id}/outline/nodes/{node_id}/siblings", post(add_sibling))
        .route("/applications/{id}/messages", get(list_messages).post(send_message))
        .route("/applications/{id}/messages/{message_id}", delete(delete_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Status code for an application-layer error. Typed errors survive
/// `anyhow` context, so the innermost recognised type decides.
pub fn error_status(error: &anyhow::Error) -> StatusCode {
    if let Some(e) = error.downcast_ref::<OrchestrationError>() {
        return match e {
            OrchestrationError::ApplicationNotFound(_)
            | OrchestrationError::NoRepository(_)
            | OrchestrationError::NoMachine(_) => StatusCode::NOT_FOUND,
            OrchestrationError::MachineBusy(_)
            | OrchestrationError::NoAddress(_)
            | OrchestrationError::NoDomain(_) => StatusCode::CONFLICT,
            OrchestrationError::MissingCredentials(_) => StatusCode::BAD_REQUEST,
        };
    }
    if let Some(e) = error.downcast_ref::<RepositoryError>() {
        return match e {
            RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
            RepositoryError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
    }
    if error.downcast_ref::<MachineError>().is_some() {
        return StatusCode::CONFLICT;
    }
    if let Some(e) = error.downcast_ref::<OutlineError>() {
        return match e {
            OutlineError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
    }
    if let Some(e) = error.downcast_ref::<GenerationError>() {
        return match e {
            GenerationError::Provider(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
    }
    if error.downcast_ref::<StageError>().is_some() {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }
    if error.downcast_ref::<SourceControlError>().is_some()
        || error.downcast_ref::<ComputeError>().is_some()
        || error.downcast_ref::<DnsError>().is_some()
        || error.downcast_ref::<EnvironmentError>().is_some()
        || error.downcast_ref::<LLMError>().is_some()
    {
        return StatusCode::BAD_GATEWAY;
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

fn respond<T: Serialize>(result: anyhow::Result<T>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ActionResult::ok(data))).into_response(),
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                error!("Request failed: {:#}", e);
            } else {
                warn!("Request rejected: {:#}", e);
            }
            (status, Json(ActionResult::<()>::failure(format!("{:#}", e)))).into_response()
        }
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ActionResult::<()>::failure(message))).into_response()
}

fn parse_application_id(id: &str) -> Result<ApplicationId, Response> {
    ApplicationId::from_string(id).map_err(|_| bad_request(format!("Invalid application id '{}'", id)))
}

macro_rules! application_id {
    ($id:expr) => {
        match parse_application_id(&$id) {
            Ok(id) => id,
            Err(response) => return response,
        }
    };
}

async fn health() -> Response {
    respond(Ok(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub github_account: Option<String>,
    /// Provision the repository and machine right away.
    #[serde(default)]
    pub provision: bool,
}

async fn list_applications(State(state): State<Arc<AppState>>) -> Response {
    respond(state.orchestrator.list_applications().await)
}

async fn create_application(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateApplicationRequest>,
) -> Response {
    if payload.name.trim().is_empty() {
        return bad_request("Application name must not be empty".to_string());
    }
    let owner = payload.owner.map(UserId);
    let account = payload.github_account.map(GitHubAccountId);

    if payload.provision {
        respond(
            state
                .orchestrator
                .create_and_provision(&payload.name, owner, account)
                .await
                .map(|report| serde_json::json!(report)),
        )
    } else {
        respond(
            state
                .orchestrator
                .create_application(&payload.name, owner, account)
                .await
                .map(|application| serde_json::json!(application)),
        )
    }
}

async fn application_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.orchestrator.status(id).await)
}

async fn provision(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.orchestrator.provision(id).await)
}

async fn teardown(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.orchestrator.teardown(id).await)
}

async fn suspend(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.orchestrator.suspend(id).await)
}

async fn resume(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.orchestrator.resume(id).await)
}

async fn redeploy(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.orchestrator.redeploy(id).await)
}

#[derive(Debug, Deserialize)]
pub struct EnvVarRequest {
    pub key: String,
    pub value: String,
}

async fn set_env_var(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<EnvVarRequest>,
) -> Response {
    let id = application_id!(id);
    respond(state.orchestrator.set_env_var(id, &payload.key, &payload.value).await)
}

async fn renew_certificate(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.orchestrator.renew_certificate(id).await)
}

async fn get_outline(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.documents.document(id).await)
}

#[derive(Debug, Deserialize)]
pub struct UpdateOutlineRequest {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub mode: MergeMode,
}

async fn update_outline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOutlineRequest>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.update_nodes(id, payload.nodes, payload.mode).await)
}

#[derive(Debug, Deserialize)]
pub struct ImportOutlineRequest {
    pub json: String,
    #[serde(default)]
    pub mode: MergeMode,
}

async fn import_outline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ImportOutlineRequest>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.import_json(id, &payload.json, payload.mode).await)
}

async fn export_outline(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.documents.export_json(id).await)
}

async fn numbered_outline(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.documents.numbered_outline(id).await)
}

#[derive(Debug, Deserialize)]
pub struct GenerateOutlineRequest {
    pub prompt: String,
    #[serde(default)]
    pub mode: MergeMode,
}

async fn generate_outline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<GenerateOutlineRequest>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.generate_outline(id, &payload.prompt, payload.mode).await)
}

fn default_max_depth() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct RepositoryOutlineBody {
    pub pattern: String,
    /// Substring a resolved import path must contain to be followed; empty
    /// follows every in-repository import.
    #[serde(default)]
    pub dependency_pattern: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

async fn outline_from_repository(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<RepositoryOutlineBody>,
) -> Response {
    let id = application_id!(id);
    let request = RepositoryOutlineRequest {
        pattern: payload.pattern,
        dependency_pattern: payload.dependency_pattern,
        max_depth: payload.max_depth,
    };
    respond(state.orchestrator.outline_from_repository(id, &request).await)
}

#[derive(Debug, Deserialize)]
pub struct LevelQuery {
    pub level: usize,
}

async fn expand_outline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LevelQuery>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.expand_to_level(id, query.level).await)
}

async fn collapse_outline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LevelQuery>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.collapse_to_level(id, query.level).await)
}

#[derive(Debug, Deserialize)]
pub struct SaveViewRequest {
    pub nodes: Vec<Node>,
}

async fn save_view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<SaveViewRequest>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.save_view(id, payload.nodes).await)
}

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct NodeCreated {
    pub document: Document,
    pub node_id: String,
}

async fn rename_node(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, String)>,
    Json(payload): Json<LabelRequest>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.rename(id, &node_id, &payload.label).await)
}

async fn remove_node(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, String)>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.remove_subtree(id, &node_id).await)
}

async fn indent_node(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, String)>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.indent(id, &node_id).await)
}

async fn outdent_node(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, String)>,
) -> Response {
    let id = application_id!(id);
    respond(state.documents.outdent(id, &node_id).await)
}

async fn add_child(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, String)>,
    Json(payload): Json<LabelRequest>,
) -> Response {
    let id = application_id!(id);
    respond(
        state
            .documents
            .add_child(id, &node_id, &payload.label)
            .await
            .map(|(document, node_id)| NodeCreated { document, node_id }),
    )
}

async fn add_sibling(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, String)>,
    Json(payload): Json<LabelRequest>,
) -> Response {
    let id = application_id!(id);
    respond(
        state
            .documents
            .add_sibling(id, &node_id, &payload.label)
            .await
            .map(|(document, node_id)| NodeCreated { document, node_id }),
    )
}

async fn list_messages(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = application_id!(id);
    respond(state.documents.list_messages(id).await)
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub restart_context: bool,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Response {
    let id = application_id!(id);
    respond(
        state
            .documents
            .send_message(id, &payload.content, payload.restart_context)
            .await,
    )
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path((id, message_id)): Path<(String, String)>,
) -> Response {
    let _ = application_id!(id);
    let message_id = match MessageId::from_string(&message_id) {
        Ok(message_id) => message_id,
        Err(_) => return bad_request(format!("Invalid message id '{}'", message_id)),
    };
    respond(state.documents.delete_message(message_id).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::compute_provisioner::ComputeProvisioner;
    use crate::application::environment::EnvironmentConfigurator;
    use crate::application::orchestrator::ProvisioningSettings;
    use crate::application::outline_generation::OutlineGenerator;
    use crate::application::repository_factory::Repositories;
    use crate::application::source_provisioner::SourceRepositoryProvisioner;
    use crate::application::test_support::{
        MockCompute, MockConnector, MockDns, MockLlm, MockSession, MockSourceControl,
    };
    use crate::domain::config::EnvironmentConfig;
    use crate::domain::source_repo::GitHubCredentials;
    use crate::infrastructure::event_bus::EventBus;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn orchestrator() -> Arc<ApplicationOrchestrator> {
        let repositories = Repositories::in_memory();
        let event_bus = Arc::new(EventBus::with_default_capacity());
        let session = Arc::new(MockSession::new("34.1.2.3").with_file(
            "/home/devspace/app/package.json",
            r#"{"scripts":{"dev":"next dev"}}"#,
        ));
        let environment = EnvironmentConfigurator::new(
            Arc::new(MockDns::default()),
            None,
            EnvironmentConfig::default(),
            "",
            300,
        )
        .with_health_poll(Duration::from_millis(1), 1);
        let documents = DocumentService::new(
            &repositories,
            Arc::new(OutlineGenerator::new(Arc::new(MockLlm::default()))),
            event_bus.clone(),
        );
        let settings = ProvisioningSettings {
            template_owner: "acme".into(),
            template_repo: "starter".into(),
            repository_owner: String::new(),
            default_credentials: Some(GitHubCredentials {
                username: "octo".into(),
                token: "t0k".into(),
            }),
            zone: "us-central1-a".into(),
            machine_type: "e2-standard-2".into(),
            source_image: "debian-12".into(),
            disk_size_gb: 30,
            network_tags: vec![],
            ssh_public_key: None,
        };
        Arc::new(ApplicationOrchestrator::new(
            repositories,
            Arc::new(SourceRepositoryProvisioner::new(Arc::new(MockSourceControl::default()))),
            Arc::new(ComputeProvisioner::new(
                Arc::new(MockCompute::default()),
                Duration::from_millis(1),
                Duration::from_secs(5),
            )),
            Arc::new(environment),
            Arc::new(MockConnector::new(session)),
            Arc::new(documents),
            event_bus,
            settings,
        ))
    }

    async fn call(router: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(app(orchestrator()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_then_fetch_status() {
        let orchestrator = orchestrator();
        let (status, body) = call(
            app(orchestrator.clone()),
            "POST",
            "/applications",
            Some(serde_json::json!({ "name": "Shop" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(app(orchestrator), "GET", &format!("/applications/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["application"]["name"], "Shop");
        assert!(body["data"]["machine"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_application_is_not_found() {
        let uri = format!("/applications/{}", ApplicationId::new());
        let (status, body) = call(app(orchestrator()), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_malformed_id_is_bad_request() {
        let (status, body) = call(app(orchestrator()), "POST", "/applications/not-a-uuid/suspend", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_conflict() {
        let orchestrator = orchestrator();
        let report = orchestrator.create_and_provision("Shop", None, None).await.unwrap();

        let uri = format!("/applications/{}/resume", report.application.id);
        let (status, body) = call(app(orchestrator), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_outline_edits_through_routes() {
        let orchestrator = orchestrator();
        let application = orchestrator.create_application("Shop", None, None).await.unwrap();
        orchestrator.documents().create_for_application(application.id).await.unwrap();
        let base = format!("/applications/{}/outline", application.id);

        let nodes = serde_json::json!({
            "nodes": [{ "id": "1", "parentId": "", "label": "Home" }],
            "mode": "replace"
        });
        let (status, _) = call(app(orchestrator.clone()), "PUT", &base, Some(nodes)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            app(orchestrator.clone()),
            "POST",
            &format!("{}/nodes/1/children", base),
            Some(serde_json::json!({ "label": "Cart" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["node_id"], "2");

        let cyclic = serde_json::json!({
            "nodes": [
                { "id": "1", "parentId": "2", "label": "A" },
                { "id": "2", "parentId": "1", "label": "B" }
            ],
            "mode": "replace"
        });
        let (status, body) = call(app(orchestrator.clone()), "PUT", &base, Some(cyclic)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = call(app(orchestrator), "DELETE", &format!("{}/nodes/99", base), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
