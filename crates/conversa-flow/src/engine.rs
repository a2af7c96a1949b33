use std::sync::Arc;

use conversa_channels::InboundMessage;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::condition::evaluate;
use crate::context::{FlowContext, RunStatus};
use crate::definition::{ActionSpec, FlowDefinition, StateType};
use crate::error::{FlowError, Result};
use crate::executor::ExecutorRegistry;
use crate::executors::{SESSION, SET};
use crate::interpolate::interpolate_json;

const DEFAULT_EVENT_SUCCESS: &str = "success";
const DEFAULT_EVENT_ERROR: &str = "error";

/// Raised after `run_actions` when `on_enter`/`actions` produced an event
/// with no matching transition.
fn unhandled(state: &str, event: &str) -> FlowError {
    FlowError::UnhandledEvent { state: state.to_string(), event: event.to_string() }
}

/// Runs `on_enter` or `actions` for the current state in order, merging each
/// output into `variables` (or, for the `set` executor, writing straight to
/// the path it names) and accumulating outbound messages. Returns the event
/// selected by the last action, defaulting to `success` when the action
/// didn't set one explicitly.
#[instrument(skip(registry, ctx, actions, input))]
async fn run_actions(
    registry: &ExecutorRegistry,
    ctx: &mut FlowContext,
    actions: &[ActionSpec],
    input: Option<&InboundMessage>,
) -> Result<(String, Vec<conversa_channels::OutboundMessage>)> {
    let mut last_event = DEFAULT_EVENT_SUCCESS.to_string();
    let mut outbound = Vec::new();

    for action in actions {
        let executor = registry
            .get(&action.executor)
            .ok_or_else(|| FlowError::UnknownExecutor(action.executor.clone()))?;

        let view = ctx.interpolation_view();
        let rendered_config = interpolate_json(&action.config, &view);

        let result = executor.execute(&rendered_config, ctx, input).await;
        outbound.extend(result.outbound);

        if let Some(output) = &result.output {
            if action.executor == SET {
                apply_set_output(ctx, output);
            } else if action.executor == SESSION {
                ctx.merge_session(output);
            } else if let Some(save_to) = rendered_config.get("save_to").and_then(Value::as_str) {
                // §4.4 `http` config's `save_to`: write the action's output to an
                // explicit context path instead of the default per-action key.
                // Generic on purpose — any executor's config may name one.
                ctx.set_path(save_to, output.clone());
            } else {
                ctx.merge_output(action.output_key(), output.clone());
            }
        }

        let raw_event = result.event.clone().unwrap_or_else(|| {
            if result.success {
                DEFAULT_EVENT_SUCCESS.to_string()
            } else {
                DEFAULT_EVENT_ERROR.to_string()
            }
        });

        // `on_success`/`on_error` rename only the executor's *default*
        // success/error event, never a custom event it chose itself
        // (`high_conf`, `yes`, `invalid`, ...) — those already carry
        // specific meaning the flow author routes on directly.
        last_event = match raw_event.as_str() {
            DEFAULT_EVENT_SUCCESS if action.on_success.is_some() => action.on_success.clone().unwrap(),
            DEFAULT_EVENT_ERROR if action.on_error.is_some() => action.on_error.clone().unwrap(),
            _ => raw_event,
        };

        if !result.success {
            break;
        }
    }

    Ok((last_event, outbound))
}

fn apply_set_output(ctx: &mut FlowContext, output: &Value) {
    let path = output.get("path").and_then(Value::as_str).unwrap_or_default().to_string();
    let value = output.get("value").cloned().unwrap_or(Value::Null);
    if !path.is_empty() {
        ctx.set_path(&path, value);
    }
}

/// One full pass of the engine loop from the "step" algorithm: terminal
/// check, input-state suspension, ordered `conditions`, action execution,
/// transition follow — repeated until the run suspends, completes, or
/// fails.
#[instrument(skip(flow, registry, ctx, input), fields(run_id = %ctx.run_id.0, flow_id = %flow.id))]
pub async fn step(
    flow: &FlowDefinition,
    registry: &ExecutorRegistry,
    ctx: &mut FlowContext,
    mut event: Option<String>,
    mut input: Option<InboundMessage>,
) -> Result<Vec<conversa_channels::OutboundMessage>> {
    let mut collected_outbound = Vec::new();
    // True only for the very first iteration of a *resume* (an event or
    // input is already on hand for the current state) — that state was
    // entered, and its `on_enter` run, by a previous `step` call.
    let mut freshly_entered = event.is_none() && input.is_none();

    loop {
        if ctx.is_terminal() {
            return Ok(collected_outbound);
        }

        let state_name = ctx.current_state.clone();
        let state = flow
            .state(&state_name)
            .ok_or_else(|| FlowError::Schema(format!("state '{state_name}' not found in flow '{}'", flow.id)))?;

        if flow.is_final(&state_name) || state.state_type == StateType::End {
            ctx.status = RunStatus::Completed;
            ctx.touch();
            return Ok(collected_outbound);
        }

        if freshly_entered && !state.on_enter.is_empty() {
            let (_, outbound) = run_actions(registry, ctx, &state.on_enter, None).await?;
            collected_outbound.extend(outbound);
        }

        if state.state_type == StateType::Input && input.is_none() && event.is_none() {
            ctx.status = RunStatus::Suspended;
            ctx.touch();
            return Ok(collected_outbound);
        }

        let view = ctx.interpolation_view();
        let mut jumped = false;
        for cond in &state.conditions {
            if evaluate(&cond.if_expr, &view) {
                ctx.enter_state(cond.then.clone());
                jumped = true;
                break;
            }
        }
        if jumped {
            freshly_entered = true;
            continue;
        }

        let effective_event = if let Some(ev) = event.take() {
            ev
        } else {
            let (ev, outbound) = run_actions(registry, ctx, &state.actions, input.as_ref()).await?;
            collected_outbound.extend(outbound);
            ev
        };
        input = None;

        match state.transitions.get(&effective_event) {
            Some(target) => {
                ctx.enter_state(target.clone());
                freshly_entered = true;
            }
            None => {
                ctx.fail("unhandled_event", format!("no transition for event '{effective_event}'"));
                warn!(state = %state_name, event = %effective_event, "unhandled transition event");
                return Err(unhandled(&state_name, &effective_event));
            }
        }
    }
}

/// Cancels a run: sets status to `cancelled`. Any outbound already committed
/// by a prior `step` call stands; no further actions run for this run.
pub fn cancel(ctx: &mut FlowContext) {
    if !ctx.is_terminal() {
        ctx.status = RunStatus::Cancelled;
        ctx.touch();
    }
}

/// Re-enters a suspended run on timer fire, synthesizing a `timeout` event
/// (§4.5 "Timeouts").
pub async fn resume_on_timeout(
    flow: &FlowDefinition,
    registry: &ExecutorRegistry,
    ctx: &mut FlowContext,
) -> Result<Vec<conversa_channels::OutboundMessage>> {
    if ctx.status != RunStatus::Suspended {
        return Err(FlowError::NotResumable(format!("run {} is not suspended", ctx.run_id.0)));
    }
    ctx.status = RunStatus::Running;
    step(flow, registry, ctx, Some("timeout".to_string()), None).await
}

/// Small convenience used by callers that already have an `Arc<FlowDefinition>`.
pub async fn step_arc(
    flow: &Arc<FlowDefinition>,
    registry: &ExecutorRegistry,
    ctx: &mut FlowContext,
    event: Option<String>,
    input: Option<InboundMessage>,
) -> Result<Vec<conversa_channels::OutboundMessage>> {
    step(flow.as_ref(), registry, ctx, event, input).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Condition, StateDefinition};
    use crate::executor::{ExecutionResult, Executor};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};

    struct AlwaysSuccess;
    #[async_trait]
    impl Executor for AlwaysSuccess {
        async fn execute(
            &self,
            _config: &Value,
            _ctx: &FlowContext,
            _input: Option<&InboundMessage>,
        ) -> ExecutionResult {
            ExecutionResult::ok(Value::Null).with_event("success")
        }
    }

    fn linear_flow() -> FlowDefinition {
        let mut states = HashMap::new();
        states.insert(
            "start".to_string(),
            StateDefinition {
                state_type: StateType::Action,
                actions: vec![ActionSpec {
                    id: None,
                    executor: "noop".to_string(),
                    config: Value::Null,
                    on_success: None,
                    on_error: None,
                }],
                transitions: [("success".to_string(), "done".to_string())].into(),
                conditions: vec![],
                timeout_seconds: None,
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        states.insert(
            "done".to_string(),
            StateDefinition {
                state_type: StateType::End,
                actions: vec![],
                transitions: HashMap::new(),
                conditions: vec![],
                timeout_seconds: None,
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        FlowDefinition {
            id: "linear".to_string(),
            name: "Linear".to_string(),
            description: String::new(),
            module: "general".to_string(),
            trigger: Some("go".to_string()),
            states,
            initial_state: "start".to_string(),
            final_states: ["done".to_string()].into(),
            enabled: true,
            version: 1,
            requires_auth: false,
        }
    }

    #[tokio::test]
    async fn runs_to_completion_on_linear_flow() {
        let flow = linear_flow();
        let registry = ExecutorRegistry::new();
        registry.register("noop", Arc::new(AlwaysSuccess));
        let mut ctx = FlowContext::new(&flow.id, flow.version, "sess-1", &flow.initial_state);

        let outbound = step(&flow, &registry, &mut ctx, None, None).await.unwrap();
        assert!(outbound.is_empty());
        assert_eq!(ctx.status, RunStatus::Completed);
        assert_eq!(ctx.current_state, "done");
    }

    #[tokio::test]
    async fn input_state_suspends_without_input() {
        let mut states = HashMap::new();
        states.insert(
            "ask".to_string(),
            StateDefinition {
                state_type: StateType::Input,
                actions: vec![],
                transitions: [("success".to_string(), "done".to_string())].into(),
                conditions: vec![],
                timeout_seconds: Some(60),
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        states.insert(
            "done".to_string(),
            StateDefinition {
                state_type: StateType::End,
                actions: vec![],
                transitions: HashMap::new(),
                conditions: vec![],
                timeout_seconds: None,
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        let flow = FlowDefinition {
            id: "ask_flow".to_string(),
            name: "Ask".to_string(),
            description: String::new(),
            module: "general".to_string(),
            trigger: None,
            states,
            initial_state: "ask".to_string(),
            final_states: ["done".to_string()].into(),
            enabled: true,
            version: 1,
            requires_auth: false,
        };
        let registry = ExecutorRegistry::new();
        let mut ctx = FlowContext::new(&flow.id, flow.version, "sess-1", &flow.initial_state);

        step(&flow, &registry, &mut ctx, None, None).await.unwrap();
        assert_eq!(ctx.status, RunStatus::Suspended);
    }

    #[tokio::test]
    async fn missing_transition_fails_run() {
        let mut states = HashMap::new();
        states.insert(
            "start".to_string(),
            StateDefinition {
                state_type: StateType::Action,
                actions: vec![ActionSpec {
                    id: None,
                    executor: "noop".to_string(),
                    config: Value::Null,
                    on_success: None,
                    on_error: None,
                }],
                transitions: HashMap::new(),
                conditions: vec![],
                timeout_seconds: None,
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        let flow = FlowDefinition {
            id: "dead_end".to_string(),
            name: "Dead End".to_string(),
            description: String::new(),
            module: "general".to_string(),
            trigger: None,
            states,
            initial_state: "start".to_string(),
            final_states: HashSet::new(),
            enabled: true,
            version: 1,
            requires_auth: false,
        };
        let registry = ExecutorRegistry::new();
        registry.register("noop", Arc::new(AlwaysSuccess));
        let mut ctx = FlowContext::new(&flow.id, flow.version, "sess-1", &flow.initial_state);

        let result = step(&flow, &registry, &mut ctx, None, None).await;
        assert!(result.is_err());
        assert_eq!(ctx.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn conditions_jump_before_actions_run() {
        let mut states = HashMap::new();
        states.insert(
            "start".to_string(),
            StateDefinition {
                state_type: StateType::Action,
                actions: vec![],
                transitions: HashMap::new(),
                conditions: vec![Condition { if_expr: "true".to_string(), then: "done".to_string() }],
                timeout_seconds: None,
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        states.insert(
            "done".to_string(),
            StateDefinition {
                state_type: StateType::End,
                actions: vec![],
                transitions: HashMap::new(),
                conditions: vec![],
                timeout_seconds: None,
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        let flow = FlowDefinition {
            id: "cond_flow".to_string(),
            name: "Cond".to_string(),
            description: String::new(),
            module: "general".to_string(),
            trigger: None,
            states,
            initial_state: "start".to_string(),
            final_states: ["done".to_string()].into(),
            enabled: true,
            version: 1,
            requires_auth: false,
        };
        let registry = ExecutorRegistry::new();
        let mut ctx = FlowContext::new(&flow.id, flow.version, "sess-1", &flow.initial_state);

        step(&flow, &registry, &mut ctx, None, None).await.unwrap();
        assert_eq!(ctx.status, RunStatus::Completed);
    }

    struct FixedOutput(Value);
    #[async_trait]
    impl Executor for FixedOutput {
        async fn execute(
            &self,
            _config: &Value,
            _ctx: &FlowContext,
            _input: Option<&InboundMessage>,
        ) -> ExecutionResult {
            ExecutionResult::ok(self.0.clone()).with_event("success")
        }
    }

    fn single_action_flow(executor: &str, config: Value) -> FlowDefinition {
        let mut states = HashMap::new();
        states.insert(
            "start".to_string(),
            StateDefinition {
                state_type: StateType::Action,
                actions: vec![ActionSpec {
                    id: None,
                    executor: executor.to_string(),
                    config,
                    on_success: None,
                    on_error: None,
                }],
                transitions: [("success".to_string(), "done".to_string())].into(),
                conditions: vec![],
                timeout_seconds: None,
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        states.insert(
            "done".to_string(),
            StateDefinition {
                state_type: StateType::End,
                actions: vec![],
                transitions: HashMap::new(),
                conditions: vec![],
                timeout_seconds: None,
                on_enter: vec![],
                on_exit: vec![],
            },
        );
        FlowDefinition {
            id: "single".to_string(),
            name: "Single".to_string(),
            description: String::new(),
            module: "general".to_string(),
            trigger: None,
            states,
            initial_state: "start".to_string(),
            final_states: ["done".to_string()].into(),
            enabled: true,
            version: 1,
            requires_auth: false,
        }
    }

    #[tokio::test]
    async fn session_executor_output_lands_in_the_reserved_session_namespace() {
        let flow = single_action_flow(SESSION, serde_json::json!({"authenticated": true, "user_id": "u1"}));
        let registry = ExecutorRegistry::new();
        registry.register(SESSION, Arc::new(crate::executors::session::SessionExecutor));
        let mut ctx = FlowContext::new(&flow.id, flow.version, "sess-1", &flow.initial_state);

        step(&flow, &registry, &mut ctx, None, None).await.unwrap();
        let session = ctx.variables.get("session").unwrap();
        assert_eq!(session["authenticated"], true);
        assert_eq!(session["user_id"], "u1");
    }

    #[tokio::test]
    async fn save_to_in_config_redirects_output_away_from_the_default_key() {
        let flow = single_action_flow("lookup", serde_json::json!({"save_to": "order.id"}));
        let registry = ExecutorRegistry::new();
        registry.register("lookup", Arc::new(FixedOutput(serde_json::json!("abc-123"))));
        let mut ctx = FlowContext::new(&flow.id, flow.version, "sess-1", &flow.initial_state);

        step(&flow, &registry, &mut ctx, None, None).await.unwrap();
        assert!(!ctx.variables.contains_key("lookup"));
        assert_eq!(ctx.variables["order"]["id"], "abc-123");
    }
}
