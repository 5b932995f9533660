// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::application::ApplicationId;
use crate::domain::document::{ConversationId, DocumentId};
use crate::domain::machine::MachineId;

/// Provisioning lifecycle events, published as each orchestration step lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProvisioningEvent {
    ApplicationCreated {
        application_id: ApplicationId,
        name: String,
        created_at: DateTime<Utc>,
    },
    RepositoryProvisioned {
        application_id: ApplicationId,
        full_name: String,
        provisioned_at: DateTime<Utc>,
    },
    MachineProvisioned {
        application_id: ApplicationId,
        machine_id: MachineId,
        ip_address: String,
        domain: Option<String>,
        provisioned_at: DateTime<Utc>,
    },
    ProvisioningFailed {
        application_id: ApplicationId,
        step: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    MachineSuspended {
        application_id: ApplicationId,
        machine_id: MachineId,
        suspended_at: DateTime<Utc>,
    },
    MachineResumed {
        application_id: ApplicationId,
        machine_id: MachineId,
        ip_address: Option<String>,
        resumed_at: DateTime<Utc>,
    },
    MachineRedeployed {
        application_id: ApplicationId,
        machine_id: MachineId,
        redeployed_at: DateTime<Utc>,
    },
    ApplicationTornDown {
        application_id: ApplicationId,
        warnings: Vec<String>,
        torn_down_at: DateTime<Utc>,
    },
}

impl ProvisioningEvent {
    pub fn application_id(&self) -> ApplicationId {
        match self {
            Self::ApplicationCreated { application_id, .. }
            | Self::RepositoryProvisioned { application_id, .. }
            | Self::MachineProvisioned { application_id, .. }
            | Self::ProvisioningFailed { application_id, .. }
            | Self::MachineSuspended { application_id, .. }
            | Self::MachineResumed { application_id, .. }
            | Self::MachineRedeployed { application_id, .. }
            | Self::ApplicationTornDown { application_id, .. } => *application_id,
        }
    }
}

/// Outline and conversation events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentEvent {
    OutlineUpdated {
        application_id: ApplicationId,
        document_id: DocumentId,
        node_count: usize,
        updated_at: DateTime<Utc>,
    },
    StageAdvanced {
        conversation_id: ConversationId,
        from: String,
        to: String,
        advanced_at: DateTime<Utc>,
    },
    ContextRestarted {
        conversation_id: ConversationId,
        restarted_at: DateTime<Utc>,
    },
}
