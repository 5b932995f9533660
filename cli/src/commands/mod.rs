// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the devspace CLI

pub mod app;
pub mod config;
pub mod outline;
pub mod serve;

pub use self::app::AppCommand;
pub use self::config::ConfigCommand;
pub use self::outline::OutlineCommand;
pub use self::serve::ServeCommand;

use anyhow::{Context, Result};
use devspace_core::domain::application::ApplicationId;

/// Parse an application id given on the command line.
pub(crate) fn parse_application_id(raw: &str) -> Result<ApplicationId> {
    ApplicationId::from_string(raw).with_context(|| format!("Invalid application id: {}", raw))
}
