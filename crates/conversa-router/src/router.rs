use std::sync::Arc;

use conversa_core::config::RoutingConfig;
use conversa_flow::{cancel, FlowContext};
use conversa_nlu::{classify_with_fallback, Classification, NluClient};
use conversa_persistence::FlowDefinitionStore;
use conversa_sessions::{PendingIntent, Session};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::types::RouteDecision;

/// Escape words that force-terminate an in-flight run before routing
/// (§4.6 step 1 exception).
const ESCAPE_WORDS: [&str; 2] = ["cancel", "restart"];

/// Implements the 6-step algorithm from §4.6. Holds no state of its own
/// beyond its collaborators — all mutation happens on the `Session` and
/// `FlowContext` the caller passes in.
pub struct IntentRouter {
    flows: Arc<FlowDefinitionStore>,
    nlu: Arc<dyn NluClient>,
    high_confidence: f64,
    routing: RoutingConfig,
}

impl IntentRouter {
    pub fn new(
        flows: Arc<FlowDefinitionStore>,
        nlu: Arc<dyn NluClient>,
        high_confidence: f64,
        routing: RoutingConfig,
    ) -> Self {
        Self { flows, nlu, high_confidence, routing }
    }

    /// Route one inbound text. `active_run`, when present, is the session's
    /// in-flight (non-terminal) run; an escape word cancels it in place
    /// (the caller still owns persisting that cancellation).
    #[instrument(skip(self, session, active_run), fields(session_id = %session.recipient_id))]
    pub async fn route(
        &self,
        text: &str,
        session: &mut Session,
        active_run: Option<&mut FlowContext>,
    ) -> Result<RouteDecision> {
        let is_escape = ESCAPE_WORDS.contains(&text.trim().to_lowercase().as_str());

        if let Some(ctx) = active_run {
            if !ctx.is_terminal() {
                if is_escape {
                    cancel(ctx);
                    debug!(run_id = %ctx.run_id, "escape word cancelled in-flight run");
                } else {
                    return Ok(RouteDecision::ResumeFlow {
                        run_id: ctx.run_id.to_string(),
                        input: text.to_string(),
                    });
                }
            }
        }

        let classification = classify_with_fallback(self.nlu.as_ref(), text, None).await;
        cache_classification(session, &classification);

        let trigger_flow = self.flows.resolve_trigger(&classification.intent)?;

        if classification.confidence >= self.high_confidence {
            if let Some(flow) = &trigger_flow {
                if !flow.requires_auth || session.authenticated() {
                    return Ok(RouteDecision::StartFlow {
                        flow_id: flow.id.clone(),
                        initial_context: entities_to_context(&classification),
                    });
                }
            }
        }

        if let Some(flow) = &trigger_flow {
            if flow.requires_auth && !session.authenticated() {
                return Ok(self.detour_to_auth(&classification, text, session));
            }
        }

        let module = session.module().unwrap_or("general");
        if let Some(fallback_id) = self.routing.fallback_flows.get(module) {
            debug!(module, fallback_id, "no confident trigger match, using module fallback");
            return Ok(RouteDecision::StartFlow {
                flow_id: fallback_id.clone(),
                initial_context: entities_to_context(&classification),
            });
        }

        if classification.intent == "unknown" {
            return Ok(RouteDecision::NoOp {
                prompt: "I'm here if you'd like to order, track a delivery, or just chat.".to_string(),
            });
        }

        Ok(RouteDecision::AskClarification {
            prompt: "Sorry, I didn't quite catch that — could you say it another way?".to_string(),
        })
    }

    /// Step 4: stash the intent that required authentication and detour to
    /// the configured auth flow. A missing `auth_flow` config degrades to
    /// `AskClarification` rather than panicking — an operator misconfigured
    /// deployment, not a caller bug.
    fn detour_to_auth(&self, classification: &Classification, text: &str, session: &mut Session) -> RouteDecision {
        session.set_pending_intent(&PendingIntent {
            intent: classification.intent.clone(),
            entities: entities_to_context(classification),
            text: text.to_string(),
        });

        match &self.routing.auth_flow {
            Some(auth_flow) => RouteDecision::StartFlow {
                flow_id: auth_flow.clone(),
                initial_context: json!({}),
            },
            None => {
                session.clear_pending_intent();
                RouteDecision::AskClarification {
                    prompt: "This needs you to sign in first, and no sign-in flow is configured.".to_string(),
                }
            }
        }
    }

    /// Pending-intent resumption: called once the auth flow's run reaches
    /// `success`. Replays the stashed text as if it had just arrived, then
    /// clears the pending intent regardless of the outcome.
    pub async fn resume_pending_intent(&self, session: &mut Session) -> Option<Result<RouteDecision>> {
        let pending = session.pending_intent()?;
        session.clear_pending_intent();
        Some(self.route(&pending.text, session, None).await)
    }
}

fn cache_classification(session: &mut Session, classification: &Classification) {
    session.data.insert(
        "last_classification".to_string(),
        serde_json::to_value(classification).unwrap_or(Value::Null),
    );
}

fn entities_to_context(classification: &Classification) -> Value {
    let mut map = serde_json::Map::new();
    for entity in &classification.entities {
        map.insert(entity.kind.clone(), Value::String(entity.value.clone()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conversa_flow::{ActionSpec, FlowDefinition, StateDefinition, StateType};
    use conversa_nlu::NluError;
    use conversa_persistence::init_db;
    use rusqlite::Connection;
    use std::collections::{HashMap, HashSet};

    struct FixedNlu(Classification);

    #[async_trait]
    impl NluClient for FixedNlu {
        async fn classify(&self, _text: &str, _language: Option<&str>) -> std::result::Result<Classification, NluError> {
            Ok(self.0.clone())
        }
    }

    fn flow(id: &str, trigger: &str, requires_auth: bool) -> FlowDefinition {
        let mut states = HashMap::new();
        states.insert(
            "start".to_string(),
            StateDefinition {
                state_type: StateType::Action,
                actions: vec![ActionSpec { id: None, executor: "response".to_string(), config: json!({}), on_success: None, on_error: None }],
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
            id: id.to_string(),
            name: "Test".to_string(),
            description: String::new(),
            module: "general".to_string(),
            trigger: Some(trigger.to_string()),
            states,
            initial_state: "start".to_string(),
            final_states: ["done".to_string()].into(),
            enabled: true,
            version: 1,
            requires_auth,
        }
    }

    fn classification(intent: &str, confidence: f64) -> Classification {
        Classification { intent: intent.to_string(), confidence, entities: vec![], language: Some("en".to_string()) }
    }

    fn store() -> Arc<FlowDefinitionStore> {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        FlowDefinitionStore::new(conn)
    }

    #[tokio::test]
    async fn high_confidence_trigger_starts_flow() {
        let flows = store();
        flows.upsert(&flow("greeting_v1", "greeting", false)).unwrap();
        let nlu: Arc<dyn NluClient> = Arc::new(FixedNlu(classification("greeting", 0.95)));
        let router = IntentRouter::new(flows, nlu, 0.80, RoutingConfig::default());
        let mut session = Session::new("web-1", conversa_core::Platform::Web);

        let decision = router.route("hi", &mut session, None).await.unwrap();
        assert!(matches!(decision, RouteDecision::StartFlow { flow_id, .. } if flow_id == "greeting_v1"));
    }

    #[tokio::test]
    async fn unauthenticated_protected_intent_detours_to_auth() {
        let flows = store();
        flows.upsert(&flow("order_food_v1", "order_food", true)).unwrap();
        let nlu: Arc<dyn NluClient> = Arc::new(FixedNlu(classification("order_food", 0.95)));
        let routing = RoutingConfig { auth_flow: Some("auth_v1".to_string()), fallback_flows: HashMap::new() };
        let router = IntentRouter::new(flows, nlu, 0.80, routing);
        let mut session = Session::new("wa-1", conversa_core::Platform::Whatsapp);

        let decision = router.route("order pizza", &mut session, None).await.unwrap();
        assert!(matches!(decision, RouteDecision::StartFlow { flow_id, .. } if flow_id == "auth_v1"));
        let pending = session.pending_intent().unwrap();
        assert_eq!(pending.intent, "order_food");
        assert_eq!(pending.text, "order pizza");
    }

    #[tokio::test]
    async fn active_run_resumes_unless_escape_word() {
        let flows = store();
        let nlu: Arc<dyn NluClient> = Arc::new(FixedNlu(classification("unknown", 0.1)));
        let router = IntentRouter::new(flows, nlu, 0.80, RoutingConfig::default());
        let mut session = Session::new("web-1", conversa_core::Platform::Web);
        let mut ctx = FlowContext::new("f1", 1, "web-1", "ask");

        let decision = router.route("42", &mut session, Some(&mut ctx)).await.unwrap();
        assert!(matches!(decision, RouteDecision::ResumeFlow { input, .. } if input == "42"));
        assert_eq!(ctx.status, conversa_flow::RunStatus::Running);
    }

    #[tokio::test]
    async fn escape_word_cancels_active_run_and_routes_fresh() {
        let flows = store();
        let nlu: Arc<dyn NluClient> = Arc::new(FixedNlu(classification("unknown", 0.1)));
        let router = IntentRouter::new(flows, nlu, 0.80, RoutingConfig::default());
        let mut session = Session::new("web-1", conversa_core::Platform::Web);
        let mut ctx = FlowContext::new("f1", 1, "web-1", "ask");

        let decision = router.route("cancel", &mut session, Some(&mut ctx)).await.unwrap();
        assert_eq!(ctx.status, conversa_flow::RunStatus::Cancelled);
        assert!(matches!(decision, RouteDecision::NoOp { .. }));
    }

    #[tokio::test]
    async fn low_confidence_without_fallback_asks_for_clarification() {
        let flows = store();
        let nlu: Arc<dyn NluClient> = Arc::new(FixedNlu(classification("order_food", 0.4)));
        let router = IntentRouter::new(flows, nlu, 0.80, RoutingConfig::default());
        let mut session = Session::new("web-1", conversa_core::Platform::Web);

        let decision = router.route("something odd", &mut session, None).await.unwrap();
        assert!(matches!(decision, RouteDecision::AskClarification { .. }));
    }

    #[tokio::test]
    async fn tied_trigger_picks_highest_version() {
        let flows = store();
        flows.upsert(&flow("order_food_v1", "order_food", false)).unwrap();
        flows.upsert(&flow("order_food_v2", "order_food", false)).unwrap();
        let nlu: Arc<dyn NluClient> = Arc::new(FixedNlu(classification("order_food", 0.95)));
        let router = IntentRouter::new(flows, nlu, 0.80, RoutingConfig::default());
        let mut session = Session::new("web-1", conversa_core::Platform::Web);

        let decision = router.route("order pizza", &mut session, None).await.unwrap();
        assert!(matches!(decision, RouteDecision::StartFlow { flow_id, .. } if flow_id == "order_food_v2"));
    }
}
