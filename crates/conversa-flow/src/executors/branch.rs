use async_trait::async_trait;
use conversa_channels::InboundMessage;
use serde::Deserialize;
use serde_json::Value;

use crate::condition::evaluate;
use crate::context::FlowContext;
use crate::executor::{ExecutionResult, Executor};

#[derive(Debug, Deserialize)]
struct BranchArm {
    #[serde(rename = "if")]
    if_expr: String,
    event: String,
}

#[derive(Debug, Deserialize, Default)]
struct BranchConfig {
    #[serde(default)]
    conditions: Vec<BranchArm>,
    #[serde(default = "default_event")]
    default_event: String,
}

fn default_event() -> String {
    "default".to_string()
}

/// Pure decision executor (§4.4): evaluates `conditions` in order against
/// the run's accumulated context, emitting the first matching arm's `event`,
/// or `default_event` ("default" unless overridden) when none match.
pub struct BranchExecutor;

#[async_trait]
impl Executor for BranchExecutor {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        _input: Option<&InboundMessage>,
    ) -> ExecutionResult {
        let cfg: BranchConfig = serde_json::from_value(config.clone()).unwrap_or_default();
        let view = ctx.interpolation_view();

        for arm in &cfg.conditions {
            if evaluate(&arm.if_expr, &view) {
                return ExecutionResult::ok(Value::Null).with_event(arm.event.clone());
            }
        }

        ExecutionResult::ok(Value::Null).with_event(cfg.default_event)
    }
}
