use serde::{Deserialize, Serialize};

/// One row of the `flows` table (§6.6) — the serialized envelope around a
/// [`conversa_flow::FlowDefinition`] plus the bookkeeping columns the store
/// needs to pick the live version for a trigger (§4.6 tie-break).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRow {
    pub id: String,
    pub version: u32,
    pub name: String,
    pub module: String,
    pub trigger: Option<String>,
    /// The full `FlowDefinition` serialized as JSON — states/transitions/
    /// conditions live here, not as separate columns (§3.2: "a directed
    /// graph stored as one row per version").
    pub definition: serde_json::Value,
    pub enabled: bool,
    pub updated_at: String,
}

/// One row of `flow_runs` (§6.6) — upserted by run_id on every `step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRunRow {
    pub run_id: String,
    pub flow_id: String,
    pub session_id: String,
    pub current_state: String,
    pub context: serde_json::Value,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
}

/// One row of `conversation_messages` (§3.4/§6.6). Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessageRow {
    pub id: i64,
    pub session_id: String,
    pub recipient_id: String,
    pub role: String,
    pub content: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub entities: Option<serde_json::Value>,
    pub turn_number: i64,
    pub routing_decision: Option<String>,
    pub processing_ms: Option<i64>,
    pub created_at: String,
}

/// One row of `training_samples` (§3.5/§6.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSampleRow {
    pub id: i64,
    pub text: String,
    pub intent: String,
    pub entities: serde_json::Value,
    pub language: Option<String>,
    pub confidence: f64,
    pub source: String,
    pub review_status: String,
    pub created_at: String,
}

/// One row of `user_profiles` (§3.6/§6.6). `attrs` holds the categorized
/// preference map; `profile_completeness` is a derived, stored column so
/// reads don't recompute it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfileRow {
    pub user_id: String,
    pub attrs: serde_json::Value,
    pub profile_completeness: f64,
    pub updated_at: String,
}
