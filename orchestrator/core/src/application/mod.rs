// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod compute_provisioner;
pub mod document_service;
pub mod environment;
pub mod orchestrator;
pub mod outline_generation;
pub mod repository_factory;
pub mod source_provisioner;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export services for convenience
pub use compute_provisioner::ComputeProvisioner;
pub use document_service::{ConversationTurn, DocumentService, RepositoryOutlineRequest};
pub use environment::{EnvironmentConfigurator, EnvironmentError, EnvironmentOutcome};
pub use orchestrator::{
    ApplicationOrchestrator, ApplicationStatus, OrchestrationError, ProvisioningReport, ProvisioningSettings,
    TeardownReport,
};
pub use outline_generation::{GenerationError, OutlineGenerator};
pub use repository_factory::{create_repositories, Repositories};
pub use source_provisioner::SourceRepositoryProvisioner;
