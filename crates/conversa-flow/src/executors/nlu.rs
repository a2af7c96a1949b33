use std::sync::Arc;

use async_trait::async_trait;
use conversa_channels::InboundMessage;
use conversa_nlu::{classify_with_fallback, Classification, NluClient};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::FlowContext;
use crate::executor::{ExecutionResult, Executor};
use crate::interpolate::resolve_path;

const DEFAULT_SOURCE_PATH: &str = "input.text";
const DEFAULT_THRESHOLD: f64 = 0.80;

#[derive(Debug, Deserialize)]
struct NluConfig {
    #[serde(default)]
    source_path: Option<String>,
    #[serde(default)]
    threshold: Option<f64>,
}

/// Classifies text pulled from `source_path` (default `input.text`) via the
/// NLU client, falling back to the keyword heuristic when the service is
/// unavailable (§4.4, §6.3). Emits `high_conf` / `low_conf` against the
/// configured (or default) confidence threshold.
pub struct NluExecutor {
    client: Arc<dyn NluClient>,
}

impl NluExecutor {
    pub fn new(client: Arc<dyn NluClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Executor for NluExecutor {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        input: Option<&InboundMessage>,
    ) -> ExecutionResult {
        let cfg: NluConfig = serde_json::from_value(config.clone()).unwrap_or(NluConfig {
            source_path: None,
            threshold: None,
        });
        let path = cfg.source_path.as_deref().unwrap_or(DEFAULT_SOURCE_PATH);
        let threshold = cfg.threshold.unwrap_or(DEFAULT_THRESHOLD);

        let mut view = ctx.interpolation_view();
        if let Value::Object(map) = &mut view {
            if let Some(msg) = input {
                let mut input_obj = serde_json::Map::new();
                input_obj.insert("text".to_string(), json!(msg.effective_text()));
                map.insert("input".to_string(), Value::Object(input_obj));
            }
        }

        let text = resolve_path(&view, path)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let classification: Classification = classify_with_fallback(self.client.as_ref(), &text, None).await;
        let event = if classification.confidence >= threshold { "high_conf" } else { "low_conf" };

        ExecutionResult::ok(serde_json::to_value(&classification).unwrap_or(Value::Null)).with_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conversa_nlu::NluError;

    struct AlwaysFails;
    #[async_trait]
    impl NluClient for AlwaysFails {
        async fn classify(&self, _text: &str, _language: Option<&str>) -> Result<Classification, NluError> {
            Err(NluError::Timeout)
        }
    }

    #[tokio::test]
    async fn falls_back_to_keyword_heuristic_and_tags_low_conf() {
        let executor = NluExecutor::new(Arc::new(AlwaysFails));
        let ctx = FlowContext::new("f1", 1, "sess", "start");
        let msg = InboundMessage {
            recipient_id: "r1".to_string(),
            platform: conversa_core::Platform::Test,
            text: Some("fjksdlf".to_string()),
            attachments: vec![],
            buttons_reply: None,
            location: None,
            received_at: conversa_core::now_rfc3339(),
            provider_message_id: None,
        };
        let result = executor.execute(&json!({}), &ctx, Some(&msg)).await;
        assert_eq!(result.event.as_deref(), Some("low_conf"));
    }
}
