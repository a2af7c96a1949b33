use std::sync::Arc;

use async_trait::async_trait;
use conversa_channels::InboundMessage;
use conversa_llm::{ChatRequest, LlmProvider, Message, ProviderError, Role};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::context::FlowContext;
use crate::executor::{ExecutionResult, Executor};
use crate::interpolate::interpolate;

const DEFAULT_MODEL: &str = "default";
const DEFAULT_MAX_TOKENS: u32 = 512;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const RETRY_BASE_MS: u64 = 150;

#[derive(Debug, Deserialize)]
struct LlmConfig {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    system: String,
    prompt: String,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
}

/// Calls the configured LLM provider with an interpolated prompt (§4.4).
/// Retries exactly once, with jittered backoff, when the provider reports a
/// transient failure — a permanent/parse failure is surfaced immediately as
/// the `error` event rather than retried.
pub struct LlmExecutor {
    provider: Arc<dyn LlmProvider>,
}

impl LlmExecutor {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

/// Same jitter shape as the channel manager's reconnect backoff: up to 30%
/// of the base delay, derived from the current-time nanosecond fraction
/// rather than a full RNG dependency.
fn jitter_millis(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let max_jitter = ((base_ms as f64) * 0.3) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

fn is_transient(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::Http(_) | ProviderError::Unavailable(_) | ProviderError::RateLimited { .. }
    )
}

#[async_trait]
impl Executor for LlmExecutor {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        _input: Option<&InboundMessage>,
    ) -> ExecutionResult {
        let cfg: LlmConfig = match serde_json::from_value(config.clone()) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "llm executor config schema error");
                return ExecutionResult::failure("error");
            }
        };

        let view = ctx.interpolation_view();
        let prompt = interpolate(&cfg.prompt, &view);
        let system = interpolate(&cfg.system, &view);

        let req = ChatRequest {
            model: cfg.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system,
            messages: vec![Message { role: Role::User, content: prompt }],
            max_tokens: cfg.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: cfg.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        };

        let mut last_err = match self.provider.send(&req).await {
            Ok(resp) => {
                return ExecutionResult::ok(json!({ "content": resp.content, "stop_reason": resp.stop_reason }))
                    .with_event("success")
            }
            Err(e) => e,
        };

        if is_transient(&last_err) {
            let jitter_ms = RETRY_BASE_MS + jitter_millis(RETRY_BASE_MS);
            tokio::time::sleep(tokio::time::Duration::from_millis(jitter_ms)).await;
            match self.provider.send(&req).await {
                Ok(resp) => {
                    return ExecutionResult::ok(json!({ "content": resp.content, "stop_reason": resp.stop_reason }))
                        .with_event("success")
                }
                Err(e) => last_err = e,
            }
        }

        warn!(error = %last_err, state = %ctx.current_state, "llm executor failed");
        ExecutionResult::failure("error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conversa_llm::ChatResponse;

    struct AlwaysOk;
    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "test"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "hello".to_string(),
                model: "test".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl LlmProvider for AlwaysFails {
        fn name(&self) -> &str {
            "test"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn success_emits_success_event() {
        let executor = LlmExecutor::new(Arc::new(AlwaysOk));
        let ctx = FlowContext::new("f1", 1, "sess", "start");
        let config = json!({"prompt": "hi", "system": "be nice"});
        let result = executor.execute(&config, &ctx, None).await;
        assert!(result.success);
        assert_eq!(result.event.as_deref(), Some("success"));
    }

    #[tokio::test]
    async fn transient_failure_retries_then_emits_error() {
        let executor = LlmExecutor::new(Arc::new(AlwaysFails));
        let ctx = FlowContext::new("f1", 1, "sess", "start");
        let config = json!({"prompt": "hi"});
        let result = executor.execute(&config, &ctx, None).await;
        assert!(!result.success);
        assert_eq!(result.event.as_deref(), Some("error"));
    }
}
