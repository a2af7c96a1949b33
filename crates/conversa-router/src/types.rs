use conversa_nlu::Classification;

/// Output of [`crate::router::IntentRouter::route`] (§4.6).
#[derive(Debug, Clone)]
pub enum RouteDecision {
    /// There is an in-flight, non-terminal run for this session — hand
    /// `text` to the engine as the suspended `input` state's answer.
    ResumeFlow { run_id: String, input: String },
    /// A matching flow trigger fired (directly, via the auth detour, or via
    /// a module fallback).
    StartFlow {
        flow_id: String,
        initial_context: serde_json::Value,
    },
    /// Confidence below threshold and no fallback flow configured for the
    /// intent's module.
    AskClarification { prompt: String },
    /// Guest browsing / small talk handled by the default conversational
    /// flow — distinguished from `AskClarification` only by copy; both
    /// compile to the same `StartFlow` in practice once a default flow is
    /// configured, so callers may fold this into `StartFlow` at the edge.
    NoOp { prompt: String },
}

/// Classification plus routing metadata cached on the session for
/// diagnostics (§4.6 step 2: "Cache the classification on the session").
#[derive(Debug, Clone)]
pub struct RoutingTrace {
    pub classification: Classification,
    pub decision_kind: &'static str,
}
