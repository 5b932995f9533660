// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SSH remote shell.
//!
//! Runs commands on provisioned machines through the system `ssh` client,
//! one process per command. Host keys are not pinned because every machine
//! is freshly created.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::remote_shell::{CommandOutput, RemoteConnector, RemoteSession, ShellError};

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub command_timeout: Duration,
    pub connect_timeout_secs: u64,
    /// Attempts made by [`SshConnector::connect`] while the machine boots
    pub readiness_attempts: u32,
    pub readiness_interval: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: "devspace".to_string(),
            identity_file: None,
            command_timeout: Duration::from_secs(600),
            connect_timeout_secs: 10,
            readiness_attempts: 30,
            readiness_interval: Duration::from_secs(5),
        }
    }
}

pub struct SshSession {
    host: String,
    options: SshOptions,
}

impl SshSession {
    pub fn new(host: impl Into<String>, options: SshOptions) -> Self {
        Self {
            host: host.into(),
            options,
        }
    }

    fn command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("LogLevel=ERROR")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.options.connect_timeout_secs));
        if let Some(identity) = &self.options.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(format!("{}@{}", self.options.user, self.host))
            .arg(remote_command)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        debug!(host = %self.host, "ssh: {}", command);
        let timeout = self.options.command_timeout;

        match tokio::time::timeout(timeout, self.command(command).output()).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                // ssh itself reports connection failures with 255
                if exit_code == 255 {
                    return Err(ShellError::Connection {
                        host: self.host.clone(),
                        detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                Ok(CommandOutput {
                    exit_code,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                })
            }
            Ok(Err(e)) => Err(ShellError::Io(format!("Failed to spawn ssh: {}", e))),
            Err(_) => Err(ShellError::Timeout(timeout.as_secs())),
        }
    }
}

pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    /// Waits until the host accepts a trivial command.
    async fn connect(&self, host: &str) -> Result<Arc<dyn RemoteSession>, ShellError> {
        let session = SshSession::new(host, self.options.clone());
        let attempts = self.options.readiness_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match session.run("true").await {
                Ok(output) if output.success() => {
                    info!(host, attempt, "SSH ready");
                    return Ok(Arc::new(session));
                }
                Ok(output) => {
                    last_error = Some(ShellError::Failed {
                        exit_code: output.exit_code,
                        stderr: output.stderr,
                    });
                }
                Err(e) => {
                    debug!(host, attempt, "SSH not ready: {}", e);
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.options.readiness_interval).await;
            }
        }

        Err(ShellError::Connection {
            host: host.to_string(),
            detail: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let session = SshSession::new(
            "34.1.2.3",
            SshOptions {
                identity_file: Some(PathBuf::from("/keys/id_ed25519")),
                ..Default::default()
            },
        );
        let cmd = session.command("uptime");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/keys/id_ed25519"));
        assert_eq!(args[args.len() - 2], "devspace@34.1.2.3");
        assert_eq!(args[args.len() - 1], "uptime");
    }
}
