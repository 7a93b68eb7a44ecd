//! LLM Router
//!
//! Selects which LLM provider answers a model call and fails over to the next
//! provider when one errors or times out. The investigation loop sees a single
//! "model call" collaborator; provider selection and per-call timeouts are the
//! router's concern, not the loop's.

use super::{LLMError, LLMProvider, Message};
use crate::config::LLMConfig;
use std::sync::Arc;
use std::time::Duration;

/// Health snapshot of one registered provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHealth<'a> {
    pub name: &'a str,
    /// Runs on this machine rather than a hosted API
    pub local: bool,
    pub healthy: bool,
}

/// LLM Router that orders providers and fails over between them
pub struct LLMRouter {
    /// Available LLM providers
    providers: Vec<Box<dyn LLMProvider>>,

    /// LLM configuration
    config: Arc<LLMConfig>,
}

impl LLMRouter {
    /// Create a new LLM router
    ///
    /// # Arguments
    /// * `providers` - List of available LLM providers
    /// * `config` - LLM configuration
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, config: Arc<LLMConfig>) -> Self {
        Self { providers, config }
    }

    /// Number of registered providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Rank providers for a call
    ///
    /// The configured default provider goes first; the rest keep their
    /// registration order. The sort is stable so ties never reorder.
    pub fn rank_providers(&self) -> Vec<&dyn LLMProvider> {
        let mut providers: Vec<&dyn LLMProvider> =
            self.providers.iter().map(|b| b.as_ref()).collect();

        let default_provider = self.config.default_provider.as_str();
        providers.sort_by_key(|p| p.name() != default_provider);

        providers
    }

    /// Call LLM providers with automatic failover
    ///
    /// Returns the generated text together with the name of the provider that
    /// produced it.
    pub async fn call(&self, messages: &[Message]) -> super::Result<(String, String)> {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No LLM providers configured".to_string(),
            ));
        }

        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        for provider in self.rank_providers() {
            tracing::debug!(
                "Attempting provider: {} (timeout: {}s)",
                provider.name(),
                timeout.as_secs()
            );

            let result = tokio::time::timeout(timeout, provider.generate(messages)).await;

            match result {
                Ok(Ok(text)) => {
                    tracing::info!("Provider {} succeeded", provider.name());
                    return Ok((text, provider.name().to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!("Provider {} failed: {}", provider.name(), e);
                }
                Err(_) => {
                    tracing::warn!(
                        "Provider {} timed out after {}s",
                        provider.name(),
                        timeout.as_secs()
                    );
                }
            }
        }

        tracing::error!("All LLM providers exhausted");
        Err(LLMError::ProviderUnavailable(
            "All LLM providers failed".to_string(),
        ))
    }

    /// Check the health of all registered providers, in routing order
    pub async fn check_health(&self) -> Vec<ProviderHealth<'_>> {
        let mut results = Vec::new();
        for provider in &self.providers {
            results.push(ProviderHealth {
                name: provider.name(),
                local: provider.is_local(),
                healthy: provider.check_health().await,
            });
        }
        results
    }
}
