//! Provider construction and passive health recording for the gateway binary.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use conversa_core::config::LlmConfig;
use conversa_llm::{
    AnthropicProvider, ChatRequest, ChatResponse, HealthTracker, LlmProvider, OpenAiProvider,
    ProviderError, ProviderRouter, ProviderSlot,
};

/// Maximum retries within a single provider slot before the router moves on
/// (§6.4: one retry with jitter on a transient failure).
const MAX_RETRIES_PER_SLOT: u32 = 1;

/// Wraps a concrete provider so every call feeds the shared [`HealthTracker`]
/// (§6.5), independent of the router's own failover bookkeeping.
struct HealthTrackingProvider {
    inner: Box<dyn LlmProvider>,
    tracker: Arc<HealthTracker>,
}

#[async_trait]
impl LlmProvider for HealthTrackingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let started = Instant::now();
        match self.inner.send(req).await {
            Ok(resp) => {
                self.tracker
                    .record_success(self.inner.name(), started.elapsed().as_millis() as u64);
                Ok(resp)
            }
            Err(err) => {
                self.tracker.record_error(self.inner.name(), &err);
                Err(err)
            }
        }
    }
}

/// Returned when no provider at all is configured — keeps `ProviderRouter`'s
/// "at least one slot" invariant satisfiable without faking credentials.
struct UnconfiguredProvider;

#[async_trait]
impl LlmProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::Unavailable(
            "no LLM provider configured".to_string(),
        ))
    }
}

/// Build the failover-ordered provider router (Anthropic first, then
/// OpenAI-compatible, per the order providers appear in config) plus the
/// health tracker that records outcomes from every call the router makes.
pub fn build_provider_router(cfg: &LlmConfig, tracker: Arc<HealthTracker>) -> Arc<ProviderRouter> {
    let mut slots = Vec::new();

    if let Some(anthropic) = &cfg.anthropic {
        let provider: Box<dyn LlmProvider> = Box::new(AnthropicProvider::new(
            anthropic.api_key.clone(),
            Some(anthropic.base_url.clone()),
        ));
        slots.push(ProviderSlot::new(
            Box::new(HealthTrackingProvider {
                inner: provider,
                tracker: tracker.clone(),
            }),
            MAX_RETRIES_PER_SLOT,
        ));
    }

    if let Some(openai) = &cfg.openai {
        let provider: Box<dyn LlmProvider> = Box::new(OpenAiProvider::new(
            openai.api_key.clone(),
            Some(openai.base_url.clone()),
        ));
        slots.push(ProviderSlot::new(
            Box::new(HealthTrackingProvider {
                inner: provider,
                tracker: tracker.clone(),
            }),
            MAX_RETRIES_PER_SLOT,
        ));
    }

    if slots.is_empty() {
        slots.push(ProviderSlot::new(Box::new(UnconfiguredProvider), 0));
    }

    Arc::new(ProviderRouter::new(slots))
}
