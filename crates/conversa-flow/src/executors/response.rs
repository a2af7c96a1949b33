use async_trait::async_trait;
use conversa_channels::{Button, InboundMessage, ListItem, OutboundMessage};
use serde::Deserialize;
use serde_json::Value;

use crate::context::FlowContext;
use crate::executor::{ExecutionResult, Executor};
use crate::interpolate::interpolate;

#[derive(Debug, Deserialize, Default)]
struct ResponseConfig {
    text: Option<String>,
    #[serde(default)]
    buttons: Vec<ButtonConfig>,
    #[serde(default)]
    list: Vec<ListItemConfig>,
}

#[derive(Debug, Deserialize)]
struct ButtonConfig {
    id: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct ListItemConfig {
    id: String,
    title: String,
    description: Option<String>,
}

/// Sends a canned message, optionally with buttons or a list (§4.4).
pub struct ResponseExecutor;

#[async_trait]
impl Executor for ResponseExecutor {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        _input: Option<&InboundMessage>,
    ) -> ExecutionResult {
        let cfg: ResponseConfig = serde_json::from_value(config.clone()).unwrap_or_default();
        let view = ctx.interpolation_view();
        let text = cfg.text.as_deref().unwrap_or("").to_string();
        let rendered_text = interpolate(&text, &view);

        let outbound = if !cfg.buttons.is_empty() {
            vec![OutboundMessage::Buttons {
                text: rendered_text,
                buttons: cfg
                    .buttons
                    .into_iter()
                    .map(|b| Button { id: b.id, label: interpolate(&b.label, &view) })
                    .collect(),
            }]
        } else if !cfg.list.is_empty() {
            vec![OutboundMessage::List {
                text: rendered_text,
                items: cfg
                    .list
                    .into_iter()
                    .map(|i| ListItem {
                        id: i.id,
                        title: interpolate(&i.title, &view),
                        description: i.description.map(|d| interpolate(&d, &view)),
                    })
                    .collect(),
            }]
        } else {
            vec![OutboundMessage::Text { text: rendered_text }]
        };

        ExecutionResult::ok(Value::Null).with_outbound(outbound).with_event("success")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn interpolates_text_and_queues_outbound() {
        let executor = ResponseExecutor;
        let mut ctx = FlowContext::new("f1", 1, "sess", "start");
        ctx.variables.insert("name".to_string(), json!("Asha"));
        let config = json!({"text": "Hi {{name}}!"});
        let result = executor.execute(&config, &ctx, None).await;
        assert!(result.success);
        assert_eq!(result.event.as_deref(), Some("success"));
        match &result.outbound[0] {
            OutboundMessage::Text { text } => assert_eq!(text, "Hi Asha!"),
            _ => panic!("expected text"),
        }
    }
}
