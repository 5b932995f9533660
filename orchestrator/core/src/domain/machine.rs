// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Machine Aggregate
//!
//! A [`Machine`] is the development VM attached to an application. Its
//! lifecycle is a small state machine:
//!
//! ```text
//! pending --provisioned--> running <--suspend/resume--> suspended
//!    |                        |                             |
//!    +--------failed----------+------------teardown---------+--> terminated
//! ```
//!
//! Only `running -> suspended` and `suspended -> running` may be requested by
//! a user; every other requested transition is rejected before any provider
//! call is made.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::application::ApplicationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(pub Uuid);

impl MachineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Pending,
    Running,
    Suspended,
    Terminated,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "suspended" => Some(Self::Suspended),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    /// Whether a user may request a move from `self` to `target`.
    pub fn can_request(&self, target: MachineState) -> bool {
        matches!(
            (self, target),
            (Self::Running, Self::Suspended) | (Self::Suspended, Self::Running)
        )
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MachineError {
    #[error("Invalid machine transition from {from} to {to}")]
    InvalidTransition { from: MachineState, to: MachineState },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub application_id: ApplicationId,
    pub instance_name: String,
    pub zone: String,
    pub state: MachineState,
    pub ip_address: Option<String>,
    /// Fully-qualified domain pointing at the machine.
    pub domain: Option<String>,
    pub backend_url: Option<String>,
    pub backend_project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Machine {
    pub fn new(application_id: ApplicationId, instance_name: impl Into<String>, zone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MachineId::new(),
            application_id,
            instance_name: instance_name.into(),
            zone: zone.into(),
            state: MachineState::Pending,
            ip_address: None,
            domain: None,
            backend_url: None,
            backend_project_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reject a user-requested transition without touching state.
    pub fn check_request(&self, target: MachineState) -> Result<(), MachineError> {
        if self.state.can_request(target) {
            Ok(())
        } else {
            Err(MachineError::InvalidTransition {
                from: self.state,
                to: target,
            })
        }
    }

    /// Provisioning finished: `pending -> running`.
    pub fn mark_provisioned(&mut self, ip_address: String) -> Result<(), MachineError> {
        if self.state != MachineState::Pending {
            return Err(MachineError::InvalidTransition {
                from: self.state,
                to: MachineState::Running,
            });
        }
        self.ip_address = Some(ip_address);
        self.transition(MachineState::Running);
        Ok(())
    }

    pub fn mark_suspended(&mut self) -> Result<(), MachineError> {
        self.check_request(MachineState::Suspended)?;
        self.transition(MachineState::Suspended);
        Ok(())
    }

    /// `suspended -> running`. The provider may hand out a new address on
    /// resume.
    pub fn mark_resumed(&mut self, ip_address: Option<String>) -> Result<(), MachineError> {
        self.check_request(MachineState::Running)?;
        if ip_address.is_some() {
            self.ip_address = ip_address;
        }
        self.transition(MachineState::Running);
        Ok(())
    }

    fn transition(&mut self, state: MachineState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> Machine {
        let mut machine = Machine::new(ApplicationId::new(), "devspace-abc", "us-central1-a");
        machine.mark_provisioned("10.0.0.2".into()).unwrap();
        machine
    }

    #[test]
    fn test_provisioned_machine_is_running() {
        let machine = running();
        assert_eq!(machine.state, MachineState::Running);
        assert_eq!(machine.ip_address.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_suspend_resume_cycle() {
        let mut machine = running();
        machine.mark_suspended().unwrap();
        assert_eq!(machine.state, MachineState::Suspended);

        machine.mark_resumed(Some("10.0.0.9".into())).unwrap();
        assert_eq!(machine.state, MachineState::Running);
        assert_eq!(machine.ip_address.as_deref(), Some("10.0.0.9"));
    }

    #[test]
    fn test_suspend_requires_running() {
        let mut machine = running();
        machine.mark_suspended().unwrap();
        let err = machine.mark_suspended().unwrap_err();
        assert_eq!(
            err,
            MachineError::InvalidTransition {
                from: MachineState::Suspended,
                to: MachineState::Suspended
            }
        );
        assert_eq!(machine.state, MachineState::Suspended);
    }

    #[test]
    fn test_pending_cannot_be_resumed() {
        let machine = Machine::new(ApplicationId::new(), "vm", "zone");
        assert!(machine.check_request(MachineState::Running).is_err());
        assert!(machine.check_request(MachineState::Terminated).is_err());
    }

    #[test]
    fn test_state_round_trip_through_text() {
        for state in [
            MachineState::Pending,
            MachineState::Running,
            MachineState::Suspended,
            MachineState::Terminated,
        ] {
            assert_eq!(MachineState::parse(state.as_str()), Some(state));
        }
    }
}
