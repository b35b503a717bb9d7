//! Tiered completion gateway
//!
//! Every agent call goes through one [`CompletionGateway`]. It resolves the
//! model tier to a provider, bounds concurrent provider calls with a
//! semaphore, applies the per-stage timeout and retries transient failures
//! with exponential backoff (`backoff_base * 2^attempt`).

use crate::config::PipelineSection;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, LlmError, LlmProvider, Message, ResponseFormat,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Cost/capability tier a role is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheap, fast model used to gather raw material
    Fast,
    /// Expensive model used to arbitrate, decide and write
    Deep,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Fast => write!(f, "fast"),
            ModelTier::Deep => write!(f, "deep"),
        }
    }
}

/// A tier resolved against configuration for one agent
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBinding {
    pub tier: ModelTier,
    pub model: String,
    pub display_name: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Gateway failure after retries are exhausted
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Provider(#[from] LlmError),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
}

/// Limits applied to every completion
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub backoff_base: Duration,
    pub max_concurrent_calls: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            retry_attempts: 1,
            backoff_base: Duration::from_millis(500),
            max_concurrent_calls: 1,
        }
    }
}

impl From<&PipelineSection> for GatewaySettings {
    fn from(section: &PipelineSection) -> Self {
        Self {
            timeout: Duration::from_secs(section.stage_timeout_secs),
            retry_attempts: section.retry_attempts,
            backoff_base: Duration::from_millis(section.backoff_base_ms),
            max_concurrent_calls: section.max_concurrent_calls.max(1),
        }
    }
}

/// Shared entry point for all provider calls in a process
pub struct CompletionGateway {
    fast: Arc<dyn LlmProvider>,
    deep: Arc<dyn LlmProvider>,
    permits: Arc<Semaphore>,
    settings: GatewaySettings,
}

impl CompletionGateway {
    pub fn new(
        fast: Arc<dyn LlmProvider>,
        deep: Arc<dyn LlmProvider>,
        settings: GatewaySettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_calls.max(1)));
        Self {
            fast,
            deep,
            permits,
            settings,
        }
    }

    /// Same provider for both tiers
    pub fn single(provider: Arc<dyn LlmProvider>, settings: GatewaySettings) -> Self {
        Self::new(provider.clone(), provider, settings)
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn provider(&self, tier: ModelTier) -> &Arc<dyn LlmProvider> {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Deep => &self.deep,
        }
    }

    /// Run one completion against the binding's tier
    pub async fn complete(
        &self,
        binding: &ModelBinding,
        messages: Vec<Message>,
        response_format: Option<ResponseFormat>,
    ) -> Result<CompletionResponse, GatewayError> {
        let provider = self.provider(binding.tier);
        let request = CompletionRequest {
            messages,
            model: binding.model.clone(),
            max_tokens: binding.max_tokens,
            temperature: binding.temperature,
            response_format,
            metadata: HashMap::from([("tier".to_string(), binding.tier.to_string())]),
        };

        let retry_attempts = self.settings.retry_attempts;
        let mut attempt = 0u32;
        loop {
            debug!(
                provider = provider.name(),
                model = %binding.model,
                attempt = attempt + 1,
                max_attempts = retry_attempts + 1,
                "Requesting completion"
            );

            let result = self.attempt(provider.as_ref(), request.clone()).await;
            match result {
                Ok(response) => return Ok(response),
                Err(e) if attempt < retry_attempts && is_retryable(&e) => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        "Completion failed, retrying..."
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        provider: &dyn LlmProvider,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::RequestFailed("completion gateway closed".to_string()))?;

        match tokio::time::timeout(self.settings.timeout, provider.complete(request)).await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::Timeout(self.settings.timeout)),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.settings
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn is_retryable(error: &GatewayError) -> bool {
    match error {
        GatewayError::Provider(e) => e.is_retryable(),
        GatewayError::Timeout(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{FailingProvider, MockLlmProvider};

    fn binding(tier: ModelTier) -> ModelBinding {
        ModelBinding {
            tier,
            model: "test-model".to_string(),
            display_name: "Test".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    fn fast_settings(retry_attempts: u32) -> GatewaySettings {
        GatewaySettings {
            timeout: Duration::from_secs(5),
            retry_attempts,
            backoff_base: Duration::from_millis(1),
            max_concurrent_calls: 1,
        }
    }

    #[test]
    fn test_tier_serialization() {
        assert_eq!(serde_json::to_string(&ModelTier::Fast).unwrap(), "\"fast\"");
        let tier: ModelTier = serde_json::from_str("\"deep\"").unwrap();
        assert_eq!(tier, ModelTier::Deep);
        assert_eq!(ModelTier::Deep.to_string(), "deep");
    }

    #[tokio::test]
    async fn test_routes_to_tier_provider() {
        let fast = Arc::new(MockLlmProvider::single_response("from fast"));
        let deep = Arc::new(MockLlmProvider::single_response("from deep"));
        let gateway = CompletionGateway::new(fast, deep, fast_settings(0));

        let response = gateway
            .complete(&binding(ModelTier::Deep), vec![Message::user("hi")], None)
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("from deep"));
    }

    #[tokio::test]
    async fn test_retries_transient_failure() {
        let provider = Arc::new(FailingProvider::failing_first(
            1,
            LlmError::ServerError("502".to_string()),
            "recovered",
        ));
        let gateway = CompletionGateway::single(provider.clone(), fast_settings(1));

        let response = gateway
            .complete(&binding(ModelTier::Fast), vec![Message::user("hi")], None)
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("recovered"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_auth_failure() {
        let provider = Arc::new(FailingProvider::failing_first(
            5,
            LlmError::AuthenticationFailed("401".to_string()),
            "never",
        ));
        let gateway = CompletionGateway::single(provider.clone(), fast_settings(3));

        let result = gateway
            .complete(&binding(ModelTier::Fast), vec![Message::user("hi")], None)
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::Provider(LlmError::AuthenticationFailed(_)))
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_last_retry() {
        let provider = Arc::new(FailingProvider::failing_first(
            10,
            LlmError::NetworkError("reset".to_string()),
            "never",
        ));
        let gateway = CompletionGateway::single(provider.clone(), fast_settings(2));

        let result = gateway
            .complete(&binding(ModelTier::Fast), vec![Message::user("hi")], None)
            .await;
        assert!(result.is_err());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let provider = Arc::new(MockLlmProvider::single_response("late").with_delay(
            Duration::from_millis(200),
        ));
        let settings = GatewaySettings {
            timeout: Duration::from_millis(20),
            ..fast_settings(0)
        };
        let gateway = CompletionGateway::single(provider, settings);

        let result = gateway
            .complete(&binding(ModelTier::Fast), vec![Message::user("hi")], None)
            .await;
        assert!(matches!(result, Err(GatewayError::Timeout(_))));
    }

    #[test]
    fn test_backoff_doubles() {
        let gateway = CompletionGateway::single(
            Arc::new(MockLlmProvider::single_response("x")),
            GatewaySettings {
                backoff_base: Duration::from_millis(100),
                ..GatewaySettings::default()
            },
        );
        assert_eq!(gateway.backoff(0), Duration::from_millis(100));
        assert_eq!(gateway.backoff(1), Duration::from_millis(200));
        assert_eq!(gateway.backoff(3), Duration::from_millis(800));
    }
}
