// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Remote Shell
//!
//! [`RemoteSession`] runs one command on a provisioned machine and returns its
//! exit code and output. The file helpers in [`RemoteSessionExt`] are built on
//! top of that single primitive so that every transport gets the same
//! idempotent read/write/upsert behaviour.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Connection to {host} failed: {detail}")]
    Connection { host: String, detail: String },

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Command failed with exit code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },
}

#[async_trait]
pub trait RemoteSession: Send + Sync {
    fn host(&self) -> &str;

    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError>;
}

/// Opens sessions to freshly provisioned hosts.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, host: &str) -> Result<Arc<dyn RemoteSession>, ShellError>;
}

/// Quote a value for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Replace or append the `KEY=value` line for `key` in dotenv-style text.
pub fn upsert_env_line(contents: &str, key: &str, value: &str) -> String {
    let prefix = format!("{}=", key);
    let line = format!("{}{}", prefix, value);
    let mut replaced = false;

    let mut lines: Vec<String> = contents
        .lines()
        .map(|existing| {
            if existing.trim_start().starts_with(&prefix) && !replaced {
                replaced = true;
                line.clone()
            } else {
                existing.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(line);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[async_trait]
pub trait RemoteSessionExt {
    /// Run a command and fail unless it exits 0.
    async fn run_checked(&self, command: &str) -> Result<CommandOutput, ShellError>;

    async fn file_exists(&self, path: &str) -> Result<bool, ShellError>;

    /// File contents, or `None` if the file does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<String>, ShellError>;

    /// Overwrite a file. Contents travel base64-encoded so no quoting of the
    /// payload is needed. `sudo` writes through `sudo tee`.
    async fn write_file(&self, path: &str, contents: &str, sudo: bool) -> Result<(), ShellError>;

    /// Create the file with `contents` if it does not exist. Returns whether
    /// it was written.
    async fn ensure_file(&self, path: &str, contents: &str) -> Result<bool, ShellError>;

    /// Upsert `key=value` into a dotenv file, creating it if needed.
    async fn upsert_env_var(&self, path: &str, key: &str, value: &str) -> Result<(), ShellError>;
}

#[async_trait]
impl<S: RemoteSession + ?Sized> RemoteSessionExt for S {
    async fn run_checked(&self, command: &str) -> Result<CommandOutput, ShellError> {
        let output = self.run(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ShellError::Failed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }

    async fn file_exists(&self, path: &str) -> Result<bool, ShellError> {
        let output = self.run(&format!("test -f {}", shell_quote(path))).await?;
        Ok(output.success())
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, ShellError> {
        if !self.file_exists(path).await? {
            return Ok(None);
        }
        let output = self.run_checked(&format!("cat {}", shell_quote(path))).await?;
        Ok(Some(output.stdout))
    }

    async fn write_file(&self, path: &str, contents: &str, sudo: bool) -> Result<(), ShellError> {
        let encoded = STANDARD.encode(contents.as_bytes());
        let sink = if sudo {
            format!("sudo tee {} > /dev/null", shell_quote(path))
        } else {
            format!("cat > {}", shell_quote(path))
        };
        self.run_checked(&format!("echo {} | base64 -d | {}", encoded, sink))
            .await
            .map(|_| ())
    }

    async fn ensure_file(&self, path: &str, contents: &str) -> Result<bool, ShellError> {
        if self.file_exists(path).await? {
            return Ok(false);
        }
        self.write_file(path, contents, false).await?;
        Ok(true)
    }

    async fn upsert_env_var(&self, path: &str, key: &str, value: &str) -> Result<(), ShellError> {
        let current = self.read_file(path).await?.unwrap_or_default();
        let updated = upsert_env_line(&current, key, value);
        if updated != current {
            self.write_file(path, &updated, false).await?;
        }
        Ok(())
    }
}
