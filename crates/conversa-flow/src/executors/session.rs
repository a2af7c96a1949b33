use async_trait::async_trait;
use conversa_channels::InboundMessage;
use serde::Deserialize;
use serde_json::Value;

use crate::context::FlowContext;
use crate::executor::{ExecutionResult, Executor};
use crate::interpolate::interpolate;

#[derive(Debug, Deserialize)]
struct SessionConfig {
    set: serde_json::Map<String, Value>,
}

/// Writes designated keys back onto the session (§4.1) — `authenticated`,
/// `user_id`, `auth_token`, `phone`, `module`, `location`. This is the only
/// bridge from a running flow to the `Session`: the engine itself operates
/// only on `FlowContext`, so a flow author who needs to mark a session
/// authenticated (e.g. the end of an auth flow) does it with this executor
/// rather than `set`, which targets `context.variables`.
///
/// Values interpolate against the flow's own context first, same as `set`.
/// The output is written under the reserved `session` variables namespace
/// (`FlowContext::merge_session`); `conversa-service`'s `after_step`
/// projects that namespace onto the real `Session` once the step returns.
pub struct SessionExecutor;

#[async_trait]
impl Executor for SessionExecutor {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        _input: Option<&InboundMessage>,
    ) -> ExecutionResult {
        let cfg: SessionConfig = match serde_json::from_value(config.clone()) {
            Ok(c) => c,
            Err(_) => return ExecutionResult::failure("error"),
        };

        let view = ctx.interpolation_view();
        let mut rendered = serde_json::Map::new();
        for (key, value) in cfg.set {
            let value = match &value {
                Value::String(s) => Value::String(interpolate(s, &view)),
                other => other.clone(),
            };
            rendered.insert(key, value);
        }

        ExecutionResult::ok(Value::Object(rendered)).with_event("success")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn interpolates_and_returns_a_flat_patch() {
        let executor = SessionExecutor;
        let mut ctx = FlowContext::new("f1", 1, "sess", "start");
        ctx.variables.insert("token".to_string(), json!("tok-123"));
        let config = json!({"set": {"authenticated": true, "auth_token": "{{token}}"}});

        let result = executor.execute(&config, &ctx, None).await;
        let output = result.output.unwrap();
        assert_eq!(output["authenticated"], true);
        assert_eq!(output["auth_token"], "tok-123");
    }

    #[tokio::test]
    async fn malformed_config_fails() {
        let executor = SessionExecutor;
        let ctx = FlowContext::new("f1", 1, "sess", "start");
        let result = executor.execute(&json!({"nope": 1}), &ctx, None).await;
        assert!(!result.success);
    }
}
