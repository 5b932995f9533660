// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each provider adapter translates between the domain generation request and
// an external API, including its structured-output parameter.

pub mod ollama;
pub mod openai;
pub mod registry;

pub use registry::{AliasedProvider, ProviderRegistry};
