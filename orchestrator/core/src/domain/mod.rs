// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Domain model: aggregates, provider boundaries and persistence contracts.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and rules; no I/O

pub mod application;
pub mod backend_project;
pub mod compute;
pub mod config;
pub mod dns;
pub mod document;
pub mod events;
pub mod llm;
pub mod machine;
pub mod outline;
pub mod remote_shell;
pub mod repository;
pub mod source_file;
pub mod source_repo;
