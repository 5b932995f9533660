// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Model Alias Resolution and Provider Management
//
// Manages LLM providers and resolves model aliases to actual providers,
// retrying with exponential backoff and falling back to a secondary provider.

use crate::domain::config::{resolve_env_value, LLMProviderConfig, ModelConfig, OrchestratorConfig};
use crate::domain::llm::{GenerationRequest, GenerationResponse, LLMError, LLMProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

/// Registry for managing LLM providers and resolving model aliases
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    alias_map: HashMap<String, (String, ModelConfig)>, // alias -> (provider_name, model_config)
    fallback_provider: Option<String>,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl ProviderRegistry {
    /// Create provider registry from orchestrator configuration
    pub fn from_config(config: &OrchestratorConfig) -> anyhow::Result<Self> {
        let mut registry = Self {
            providers: HashMap::new(),
            alias_map: HashMap::new(),
            fallback_provider: config.llm_selection.fallback_provider.clone(),
            max_retries: config.llm_selection.max_retries.max(1),
            retry_delay_ms: config.llm_selection.retry_delay_ms,
        };

        info!("Initializing LLM provider registry");

        for provider_config in &config.llm_providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }

            match Self::create_provider(provider_config) {
                Ok(provider) => {
                    registry.register(provider_config.name.clone(), provider, &provider_config.models)
                }
                Err(e) => {
                    warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
                }
            }
        }

        if registry.providers.is_empty() {
            warn!("No LLM providers configured - outline generation will not be available");
        }

        Ok(registry)
    }

    /// Register an already constructed provider under `name`
    pub fn register(&mut self, name: String, provider: Arc<dyn LLMProvider>, models: &[ModelConfig]) {
        for model_config in models {
            info!("Mapping alias '{}' -> {} ({})", model_config.alias, model_config.model, name);
            self.alias_map
                .insert(model_config.alias.clone(), (name.clone(), model_config.clone()));
        }
        self.providers.insert(name, provider);
    }

    fn create_provider(config: &LLMProviderConfig) -> anyhow::Result<Arc<dyn LLMProvider>> {
        let api_key = match &config.api_key {
            Some(key) => resolve_env_value(key)?,
            None => String::new(),
        };
        let model = config
            .models
            .first()
            .ok_or_else(|| anyhow::anyhow!("No models configured"))?
            .model
            .clone();

        let provider: Arc<dyn LLMProvider> = match config.provider_type.as_str() {
            "openai" | "openai-compatible" => {
                Arc::new(OpenAIAdapter::new(config.endpoint.clone(), api_key, model))
            }
            "ollama" => Arc::new(OllamaAdapter::new(config.endpoint.clone(), model)),
            _ => anyhow::bail!("Unsupported provider type: {}", config.provider_type),
        };

        Ok(provider)
    }

    /// Generate using a model alias. Retries with exponential backoff and
    /// tries the fallback provider after the last failed attempt.
    pub async fn generate(
        &self,
        alias: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, LLMError> {
        let (provider_name, _model_config) = self
            .alias_map
            .get(alias)
            .ok_or_else(|| LLMError::ModelNotFound(format!("Model alias '{}' not found", alias)))?;

        let provider = self.providers.get(provider_name).ok_or_else(|| {
            LLMError::Provider(format!("Provider '{}' not found", provider_name))
        })?;

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match provider.generate(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        "Generation failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    // Credentials will not fix themselves between attempts
                    let retryable = !matches!(e, LLMError::Authentication(_) | LLMError::InvalidInput(_));
                    last_error = Some(e);

                    if !retryable || attempt == self.max_retries - 1 {
                        break;
                    }

                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        self.retry_delay_ms * 2_u64.pow(attempt),
                    ))
                    .await;
                }
            }
        }

        if let Some(fallback) = &self.fallback_provider {
            if fallback != provider_name {
                if let Some(fallback_provider) = self.providers.get(fallback) {
                    info!("Trying fallback provider: {}", fallback);
                    return fallback_provider.generate(request).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Provider("Unknown error".into())))
    }

    /// Check health of all providers
    pub async fn health_check_all(&self) -> HashMap<String, Result<(), LLMError>> {
        let mut results = HashMap::new();

        for (name, provider) in &self.providers {
            results.insert(name.clone(), provider.health_check().await);
        }

        results
    }

    pub fn available_aliases(&self) -> Vec<String> {
        self.alias_map.keys().cloned().collect()
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.alias_map.contains_key(alias)
    }
}

/// A registry pinned to one alias, usable wherever a plain provider is expected
pub struct AliasedProvider {
    registry: Arc<ProviderRegistry>,
    alias: String,
}

impl AliasedProvider {
    pub fn new(registry: Arc<ProviderRegistry>, alias: impl Into<String>) -> Self {
        Self {
            registry,
            alias: alias.into(),
        }
    }
}

#[async_trait]
impl LLMProvider for AliasedProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LLMError> {
        self.registry.generate(&self.alias, request).await
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let (provider_name, _) = self
            .registry
            .alias_map
            .get(&self.alias)
            .ok_or_else(|| LLMError::ModelNotFound(self.alias.clone()))?;
        match self.registry.providers.get(provider_name) {
            Some(provider) => provider.health_check().await,
            None => Err(LLMError::Provider(format!("Provider '{}' not found", provider_name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::LLMSelection;
    use crate::domain::llm::{FinishReason, TokenUsage};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(LLMError::Network("connection reset".into()));
            }
            Ok(GenerationResponse {
                text: "{}".into(),
                usage: TokenUsage::default(),
                provider: "flaky".into(),
                model: "m".into(),
                finish_reason: FinishReason::Stop,
            })
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    fn model(alias: &str) -> ModelConfig {
        ModelConfig {
            alias: alias.to_string(),
            model: "llama3.2".to_string(),
            context_window: 8192,
        }
    }

    #[test]
    fn test_registry_creation() {
        let config = OrchestratorConfig {
            llm_providers: vec![LLMProviderConfig {
                name: "local".to_string(),
                provider_type: "ollama".to_string(),
                endpoint: "http://localhost:11434".to_string(),
                api_key: None,
                enabled: true,
                models: vec![model("default")],
            }],
            llm_selection: LLMSelection::default(),
            ..Default::default()
        };

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.has_alias("default"));
        assert_eq!(registry.available_aliases().len(), 1);
    }

    #[test]
    fn test_unsupported_provider_is_skipped() {
        let config = OrchestratorConfig {
            llm_providers: vec![LLMProviderConfig {
                name: "mystery".to_string(),
                provider_type: "carrier-pigeon".to_string(),
                endpoint: String::new(),
                api_key: None,
                enabled: true,
                models: vec![model("default")],
            }],
            ..Default::default()
        };

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(!registry.has_alias("default"));
    }

    #[tokio::test]
    async fn test_generate_retries_until_success() {
        let config = OrchestratorConfig {
            llm_selection: LLMSelection {
                max_retries: 3,
                retry_delay_ms: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut registry = ProviderRegistry::from_config(&config).unwrap();
        let flaky = Arc::new(FlakyProvider {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        registry.register("flaky".into(), flaky.clone(), &[model("default")]);

        let aliased = AliasedProvider::new(Arc::new(registry), "default");
        let response = aliased.generate(&GenerationRequest::default()).await.unwrap();
        assert_eq!(response.provider, "flaky");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_alias() {
        let registry = ProviderRegistry::from_config(&OrchestratorConfig::default()).unwrap();
        let err = registry.generate("missing", &GenerationRequest::default()).await.unwrap_err();
        assert!(matches!(err, LLMError::ModelNotFound(_)));
    }
}
