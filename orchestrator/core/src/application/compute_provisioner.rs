// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Compute Provisioner
//!
//! Drives the [`ComputeProvider`] for one machine: create and wait for an
//! address, suspend, resume and delete. Every long-running provider operation
//! is polled to completion under an explicit deadline.
//!
//! Suspend and resume validate the requested transition before any remote
//! call and return an updated copy of the machine, so a failed operation
//! never leaves a half-applied state on the caller's record.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::domain::compute::{
    ComputeError, ComputeProvider, InstanceSpec, OperationHandle, OperationStatus,
};
use crate::domain::machine::{Machine, MachineState};

pub struct ComputeProvisioner {
    provider: Arc<dyn ComputeProvider>,
    poll_interval: Duration,
    operation_timeout: Duration,
}

impl ComputeProvisioner {
    pub fn new(provider: Arc<dyn ComputeProvider>, poll_interval: Duration, operation_timeout: Duration) -> Self {
        Self {
            provider,
            poll_interval,
            operation_timeout,
        }
    }

    /// Poll until the operation is done, failing with
    /// [`ComputeError::OperationFailed`] when the provider reports an error and
    /// [`ComputeError::Timeout`] when the deadline passes.
    pub async fn wait_for_operation(&self, operation: &OperationHandle) -> Result<(), ComputeError> {
        let poll = async {
            loop {
                match self.provider.poll_operation(operation).await? {
                    OperationStatus::Done { error: None } => return Ok(()),
                    OperationStatus::Done { error: Some(detail) } => {
                        return Err(ComputeError::OperationFailed {
                            operation: operation.name.clone(),
                            detail,
                        })
                    }
                    OperationStatus::Pending | OperationStatus::Running => {
                        debug!(operation = %operation.name, "Operation in progress");
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        };

        tokio::time::timeout(self.operation_timeout, poll)
            .await
            .map_err(|_| ComputeError::Timeout(operation.name.clone()))?
    }

    /// Create the instance and wait until it has an external address.
    pub async fn provision_instance(&self, spec: &InstanceSpec) -> Result<String> {
        info!("Creating instance {} in {}", spec.name, spec.zone);
        let operation = self
            .provider
            .create_instance(spec)
            .await
            .with_context(|| format!("Failed to create instance {}", spec.name))?;
        self.wait_for_operation(&operation)
            .await
            .with_context(|| format!("Instance {} did not come up", spec.name))?;

        let ip = self.wait_for_address(&spec.zone, &spec.name).await?;
        info!("Instance {} running at {}", spec.name, ip);
        Ok(ip)
    }

    async fn wait_for_address(&self, zone: &str, name: &str) -> Result<String> {
        let lookup = async {
            loop {
                let instance = self.provider.get_instance(zone, name).await?;
                if let Some(ip) = instance.external_ip.filter(|ip| !ip.is_empty()) {
                    return Ok::<_, ComputeError>(ip);
                }
                debug!(instance = name, status = %instance.status, "Waiting for external address");
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        let ip = tokio::time::timeout(self.operation_timeout, lookup)
            .await
            .map_err(|_| ComputeError::Timeout(format!("address of {}", name)))??;
        Ok(ip)
    }

    /// Suspend a running machine, preserving its memory image.
    pub async fn suspend(&self, machine: &Machine) -> Result<Machine> {
        machine.check_request(MachineState::Suspended)?;

        info!("Suspending instance {}", machine.instance_name);
        let operation = self
            .provider
            .suspend_instance(&machine.zone, &machine.instance_name)
            .await
            .with_context(|| format!("Failed to suspend instance {}", machine.instance_name))?;
        self.wait_for_operation(&operation)
            .await
            .with_context(|| format!("Suspend of {} failed", machine.instance_name))?;

        let mut updated = machine.clone();
        updated.mark_suspended()?;
        Ok(updated)
    }

    /// Resume a suspended machine and re-read its address, which may change.
    pub async fn resume(&self, machine: &Machine) -> Result<Machine> {
        machine.check_request(MachineState::Running)?;

        info!("Resuming instance {}", machine.instance_name);
        let operation = self
            .provider
            .resume_instance(&machine.zone, &machine.instance_name)
            .await
            .with_context(|| format!("Failed to resume instance {}", machine.instance_name))?;
        self.wait_for_operation(&operation)
            .await
            .with_context(|| format!("Resume of {} failed", machine.instance_name))?;

        let ip = self
            .wait_for_address(&machine.zone, &machine.instance_name)
            .await?;

        let mut updated = machine.clone();
        updated.mark_resumed(Some(ip))?;
        Ok(updated)
    }

    /// Delete an instance. An instance that is already gone counts as deleted.
    pub async fn delete_instance(&self, zone: &str, name: &str) -> Result<()> {
        let operation = match self.provider.delete_instance(zone, name).await {
            Ok(operation) => operation,
            Err(ComputeError::NotFound(_)) => {
                info!("Instance {} already absent", name);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to delete instance {}", name)),
        };

        match self.wait_for_operation(&operation).await {
            Ok(()) | Err(ComputeError::NotFound(_)) => {
                info!("Deleted instance {}", name);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Delete of {} failed", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::ApplicationId;
    use crate::domain::compute::InstanceInfo;
    use crate::domain::machine::MachineError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockCompute {
        statuses: Mutex<VecDeque<OperationStatus>>,
        addresses: Mutex<VecDeque<Option<String>>>,
        calls: Mutex<Vec<String>>,
        delete_missing: bool,
    }

    impl MockCompute {
        fn handle(&self, call: &str, name: &str) -> OperationHandle {
            self.calls.lock().push(format!("{}:{}", call, name));
            OperationHandle {
                name: format!("op-{}", call),
                zone: "us-central1-a".into(),
            }
        }
    }

    #[async_trait]
    impl ComputeProvider for MockCompute {
        async fn create_instance(&self, spec: &InstanceSpec) -> Result<OperationHandle, ComputeError> {
            Ok(self.handle("create", &spec.name))
        }

        async fn delete_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
            if self.delete_missing {
                return Err(ComputeError::NotFound(name.to_string()));
            }
            Ok(self.handle("delete", name))
        }

        async fn suspend_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
            Ok(self.handle("suspend", name))
        }

        async fn resume_instance(&self, _zone: &str, name: &str) -> Result<OperationHandle, ComputeError> {
            Ok(self.handle("resume", name))
        }

        async fn get_instance(&self, zone: &str, name: &str) -> Result<InstanceInfo, ComputeError> {
            let ip = self.addresses.lock().pop_front().unwrap_or(Some("10.0.0.1".into()));
            Ok(InstanceInfo {
                name: name.to_string(),
                zone: zone.to_string(),
                status: "RUNNING".into(),
                external_ip: ip,
            })
        }

        async fn poll_operation(&self, _operation: &OperationHandle) -> Result<OperationStatus, ComputeError> {
            Ok(self
                .statuses
                .lock()
                .pop_front()
                .unwrap_or(OperationStatus::Done { error: None }))
        }
    }

    fn provisioner(mock: Arc<MockCompute>) -> ComputeProvisioner {
        ComputeProvisioner::new(mock, Duration::from_millis(1), Duration::from_secs(5))
    }

    fn spec() -> InstanceSpec {
        InstanceSpec {
            name: "devspace-shop".into(),
            zone: "us-central1-a".into(),
            machine_type: "e2-standard-2".into(),
            source_image: "debian-12".into(),
            disk_size_gb: 30,
            network_tags: vec![],
            ssh_public_key: None,
        }
    }

    fn running_machine() -> Machine {
        let mut machine = Machine::new(ApplicationId::new(), "devspace-shop", "us-central1-a");
        machine.mark_provisioned("10.0.0.1".into()).unwrap();
        machine
    }

    #[tokio::test]
    async fn test_provision_waits_for_operation_and_address() {
        let mock = Arc::new(MockCompute::default());
        mock.statuses.lock().extend([OperationStatus::Pending, OperationStatus::Running]);
        mock.addresses.lock().extend([None, Some("34.1.2.3".into())]);

        let ip = provisioner(mock.clone()).provision_instance(&spec()).await.unwrap();
        assert_eq!(ip, "34.1.2.3");
        assert_eq!(mock.calls.lock().as_slice(), ["create:devspace-shop"]);
    }

    #[tokio::test]
    async fn test_operation_error_is_surfaced() {
        let mock = Arc::new(MockCompute::default());
        mock.statuses.lock().push_back(OperationStatus::Done {
            error: Some("QUOTA_EXCEEDED: out of CPUs".into()),
        });

        let err = provisioner(mock).provision_instance(&spec()).await.unwrap_err();
        let compute_err = err.downcast_ref::<ComputeError>().unwrap();
        assert!(matches!(compute_err, ComputeError::OperationFailed { detail, .. } if detail.contains("QUOTA")));
    }

    #[tokio::test]
    async fn test_operation_wait_times_out() {
        let mock = Arc::new(MockCompute::default());
        mock.statuses.lock().extend((0..10_000).map(|_| OperationStatus::Running));
        let provisioner = ComputeProvisioner::new(mock, Duration::from_millis(5), Duration::from_millis(20));

        let operation = OperationHandle {
            name: "op-slow".into(),
            zone: "z".into(),
        };
        let err = provisioner.wait_for_operation(&operation).await.unwrap_err();
        assert!(matches!(err, ComputeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_suspend_then_resume_reacquires_address() {
        let mock = Arc::new(MockCompute::default());
        mock.addresses.lock().push_back(Some("34.9.9.9".into()));
        let provisioner = provisioner(mock.clone());

        let suspended = provisioner.suspend(&running_machine()).await.unwrap();
        assert_eq!(suspended.state, MachineState::Suspended);

        let resumed = provisioner.resume(&suspended).await.unwrap();
        assert_eq!(resumed.state, MachineState::Running);
        assert_eq!(resumed.ip_address.as_deref(), Some("34.9.9.9"));
    }

    #[tokio::test]
    async fn test_invalid_transition_makes_no_provider_call() {
        let mock = Arc::new(MockCompute::default());
        let provisioner = provisioner(mock.clone());
        let machine = running_machine();

        let err = provisioner.resume(&machine).await.unwrap_err();
        assert!(err.downcast_ref::<MachineError>().is_some());
        assert!(mock.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_suspend_leaves_machine_unchanged() {
        let mock = Arc::new(MockCompute::default());
        mock.statuses.lock().push_back(OperationStatus::Done {
            error: Some("INTERNAL".into()),
        });
        let machine = running_machine();

        assert!(provisioner(mock).suspend(&machine).await.is_err());
        assert_eq!(machine.state, MachineState::Running);
    }

    #[tokio::test]
    async fn test_delete_missing_instance_is_success() {
        let mock = Arc::new(MockCompute {
            delete_missing: true,
            ..Default::default()
        });
        assert!(provisioner(mock).delete_instance("z", "gone").await.is_ok());
    }
}
