// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod backend_project;
pub mod db;
pub mod event_bus;
pub mod gcp;
pub mod github;
pub mod llm;
pub mod repositories;
pub mod ssh;
