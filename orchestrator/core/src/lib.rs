// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Devspace orchestrator core
//!
//! Provisions a per-application cloud development environment (template
//! repository, compute instance, DNS, TLS, dev server) and maintains the
//! application's outline document and guided conversation.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, provider adapters and
//!   the HTTP action boundary

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
