// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{MockGitHub, ScriptedLlm, World};
use devspace_core::application::OrchestrationError;
use devspace_core::domain::application::UserId;
use devspace_core::domain::document::Document;
use devspace_core::domain::events::ProvisioningEvent;
use devspace_core::domain::machine::{Machine, MachineError, MachineState};
use devspace_core::domain::repository::RepositoryError;
use devspace_core::infrastructure::event_bus::DomainEvent;

#[tokio::test]
async fn test_full_lifecycle() {
    let world = World::new();
    let mut events = world.event_bus.subscribe();

    let report = world
        .orchestrator
        .create_and_provision("Recipe Box", Some(UserId("user-1".to_string())), None)
        .await
        .unwrap();
    let app_id = report.application.id;

    assert_eq!(report.repository.owner, "devspace-apps");
    assert!(report.repository.name.starts_with("recipe-box-"));
    assert_eq!(report.machine.state, MachineState::Running);
    assert_eq!(report.machine.ip_address.as_deref(), Some("35.0.0.7"));
    let domain = report.machine.domain.clone().unwrap();
    assert!(domain.ends_with(".apps.example.dev"));
    assert!(world.dns.records.lock().contains_key(&domain));
    assert_eq!(world.backend.live.lock().len(), 1);
    assert!(report.document_created);

    let env = world.host.files.lock()["/home/devspace/app/.env.local"].clone();
    assert!(env.contains("BACKEND_URL="));
    assert!(env.contains("PORT=3000"));
    assert!(world.host.ran("certbot certonly"));

    let suspended = world.orchestrator.suspend(app_id).await.unwrap();
    assert_eq!(suspended.state, MachineState::Suspended);
    let resumed = world.orchestrator.resume(app_id).await.unwrap();
    assert_eq!(resumed.state, MachineState::Running);
    world.orchestrator.redeploy(app_id).await.unwrap();
    assert!(world.host.ran("git pull --ff-only"));

    let teardown = world.orchestrator.teardown(app_id).await.unwrap();
    assert!(teardown.warnings.is_empty(), "{:?}", teardown.warnings);
    assert!(world.github.repositories.lock().is_empty());
    assert!(world.compute.instances.lock().is_empty());
    assert!(world.dns.records.lock().is_empty());
    assert!(world.backend.live.lock().is_empty());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::Provisioning(event) = event {
            assert_eq!(event.application_id(), app_id);
            seen.push(match event {
                ProvisioningEvent::ApplicationCreated { .. } => "created",
                ProvisioningEvent::RepositoryProvisioned { .. } => "repository",
                ProvisioningEvent::MachineProvisioned { .. } => "machine",
                ProvisioningEvent::ProvisioningFailed { .. } => "failed",
                ProvisioningEvent::MachineSuspended { .. } => "suspended",
                ProvisioningEvent::MachineResumed { .. } => "resumed",
                ProvisioningEvent::MachineRedeployed { .. } => "redeployed",
                ProvisioningEvent::ApplicationTornDown { .. } => "torn-down",
            });
        }
    }
    assert_eq!(
        seen,
        vec!["created", "repository", "machine", "suspended", "resumed", "redeployed", "torn-down"]
    );
}

#[tokio::test]
async fn test_teardown_continues_past_provider_404() {
    let world = World::with(
        MockGitHub {
            deleted_remotely: true,
            ..Default::default()
        },
        ScriptedLlm::default(),
    );
    let report = world.orchestrator.create_and_provision("Notes", None, None).await.unwrap();
    let app_id = report.application.id;

    let teardown = world.orchestrator.teardown(app_id).await.unwrap();
    assert!(teardown.warnings.is_empty(), "{:?}", teardown.warnings);

    let repos = &world.repositories;
    assert!(repos.applications.find_by_id(app_id).await.unwrap().is_none());
    assert!(repos.source_repos.find_by_application(app_id).await.unwrap().is_none());
    assert!(repos.machines.find_by_application(app_id).await.unwrap().is_none());
    assert!(repos.documents.find_by_application(app_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_teardown_tolerates_resources_removed_out_of_band() {
    let world = World::new();
    let report = world.orchestrator.create_and_provision("Notes", None, None).await.unwrap();

    world.compute.instances.lock().clear();
    world.dns.records.lock().clear();

    let teardown = world.orchestrator.teardown(report.application.id).await.unwrap();
    assert!(teardown.warnings.is_empty(), "{:?}", teardown.warnings);
}

#[tokio::test]
async fn test_provision_is_resumable() {
    let world = World::new();
    let first = world.orchestrator.create_and_provision("Notes", None, None).await.unwrap();
    let second = world.orchestrator.provision(first.application.id).await.unwrap();

    assert_eq!(first.repository.id, second.repository.id);
    assert_eq!(first.machine.id, second.machine.id);
    assert_eq!(world.github.repositories.lock().len(), 1);
    assert_eq!(world.compute.instances.lock().len(), 1);
}

#[tokio::test]
async fn test_second_records_per_application_conflict() {
    let world = World::new();
    let report = world.orchestrator.create_and_provision("Notes", None, None).await.unwrap();
    let app_id = report.application.id;

    let mut duplicate = Machine::new(app_id, "devspace-other", "europe-west1-b");
    duplicate.mark_provisioned("10.0.0.1".to_string()).unwrap();
    let err = world.repositories.machines.insert(&duplicate).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));

    let err = world.repositories.documents.insert(&Document::new(app_id)).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));

    let stored = world.repositories.machines.find_by_application(app_id).await.unwrap().unwrap();
    assert_eq!(stored, report.machine);
}

#[tokio::test]
async fn test_transition_rules_are_enforced() {
    let world = World::new();
    let report = world.orchestrator.create_and_provision("Notes", None, None).await.unwrap();
    let app_id = report.application.id;

    let err = world.orchestrator.resume(app_id).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MachineError>(),
        Some(MachineError::InvalidTransition { .. })
    ));

    world.orchestrator.suspend(app_id).await.unwrap();
    let err = world.orchestrator.suspend(app_id).await.unwrap_err();
    assert!(err.downcast_ref::<MachineError>().is_some());
    let err = world.orchestrator.redeploy(app_id).await.unwrap_err();
    assert!(err.downcast_ref::<MachineError>().is_some());
}

#[tokio::test]
async fn test_unknown_application() {
    let world = World::new();
    let err = world
        .orchestrator
        .teardown(devspace_core::domain::application::ApplicationId::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<OrchestrationError>(),
        Some(OrchestrationError::ApplicationNotFound(_))
    ));
}
