use async_trait::async_trait;
use conversa_channels::InboundMessage;
use serde::Deserialize;
use serde_json::Value;

use crate::context::FlowContext;
use crate::executor::{ExecutionResult, Executor};
use crate::interpolate::interpolate;

#[derive(Debug, Deserialize)]
struct SetConfig {
    path: String,
    value: Value,
}

/// Writes an interpolated value into `context.variables` at `path` (§4.4).
/// String values are rendered through the placeholder engine first; other
/// JSON types (numbers, booleans, objects) pass through untouched.
pub struct SetExecutor;

#[async_trait]
impl Executor for SetExecutor {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        _input: Option<&InboundMessage>,
    ) -> ExecutionResult {
        let cfg: SetConfig = match serde_json::from_value(config.clone()) {
            Ok(c) => c,
            Err(_) => return ExecutionResult::failure("error"),
        };

        let view = ctx.interpolation_view();
        let rendered = match &cfg.value {
            Value::String(s) => Value::String(interpolate(s, &view)),
            other => other.clone(),
        };

        ExecutionResult::ok(serde_json::json!({ "path": cfg.path, "value": rendered })).with_event("success")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn interpolates_string_values() {
        let executor = SetExecutor;
        let mut ctx = FlowContext::new("f1", 1, "sess", "start");
        ctx.variables.insert("city".to_string(), json!("Pune"));
        let config = json!({"path": "order.city", "value": "{{city}}"});
        let result = executor.execute(&config, &ctx, None).await;
        assert_eq!(result.output.unwrap()["value"], "Pune");
    }

    #[tokio::test]
    async fn passes_through_non_string_values() {
        let executor = SetExecutor;
        let ctx = FlowContext::new("f1", 1, "sess", "start");
        let config = json!({"path": "order.qty", "value": 3});
        let result = executor.execute(&config, &ctx, None).await;
        assert_eq!(result.output.unwrap()["value"], 3);
    }
}
