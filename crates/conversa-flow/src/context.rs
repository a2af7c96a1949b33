use conversa_core::{now_rfc3339, RunId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Run status (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub kind: String,
    pub message: String,
    pub state: String,
}

/// Per-run mutable record (§3.3). Owned exclusively by the Flow Engine loop
/// on the node holding the run; mutated only inside `step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowContext {
    pub run_id: RunId,
    pub flow_id: String,
    pub flow_version: u32,
    pub session_id: String,
    pub user_id: Option<String>,

    pub current_state: String,
    pub previous_state: Option<String>,

    pub variables: serde_json::Map<String, Value>,
    pub collected_data: serde_json::Map<String, Value>,

    /// Bounded list of visited states — append-only (§8 invariant 4).
    pub state_history: Vec<String>,

    pub started_at: String,
    pub updated_at: String,
    pub status: RunStatus,
    pub last_error: Option<LastError>,
}

/// `state_history` is capped so a pathologically long-running or looping
/// flow doesn't grow context unbounded; the cap is generous relative to any
/// realistic flow depth.
const MAX_STATE_HISTORY: usize = 200;

impl FlowContext {
    pub fn new(flow_id: impl Into<String>, flow_version: u32, session_id: impl Into<String>, initial_state: impl Into<String>) -> Self {
        let now = now_rfc3339();
        let initial_state = initial_state.into();
        Self {
            run_id: RunId::new(),
            flow_id: flow_id.into(),
            flow_version,
            session_id: session_id.into(),
            user_id: None,
            current_state: initial_state.clone(),
            previous_state: None,
            variables: serde_json::Map::new(),
            collected_data: serde_json::Map::new(),
            state_history: vec![initial_state],
            started_at: now.clone(),
            updated_at: now,
            status: RunStatus::Running,
            last_error: None,
        }
    }

    pub fn enter_state(&mut self, state: impl Into<String>) {
        let state = state.into();
        self.previous_state = Some(std::mem::replace(&mut self.current_state, state.clone()));
        self.state_history.push(state);
        if self.state_history.len() > MAX_STATE_HISTORY {
            let excess = self.state_history.len() - MAX_STATE_HISTORY;
            self.state_history.drain(0..excess);
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }

    pub fn merge_output(&mut self, key: &str, output: Value) {
        self.variables.insert(key.to_string(), output);
        self.touch();
    }

    /// Write `value` into `variables` at a dotted `path`, creating
    /// intermediate objects as needed. Used by the `set` executor, which
    /// targets an arbitrary context path rather than its own output key.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let mut segments = path.split('.').peekable();
        let Some(first) = segments.next() else { return };

        if segments.peek().is_none() {
            self.variables.insert(first.to_string(), value);
            self.touch();
            return;
        }

        let mut current = self
            .variables
            .entry(first.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));

        while let Some(segment) = segments.next() {
            if !current.is_object() {
                *current = Value::Object(serde_json::Map::new());
            }
            let map = current.as_object_mut().expect("just ensured object");
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                break;
            }
            current = map.entry(segment.to_string()).or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
        self.touch();
    }

    /// Deep-merges `patch` into `variables["session"]` — the reserved
    /// namespace the `session` executor writes to. The conversation service
    /// projects this namespace onto the real `Session` after every `step`
    /// (the only bridge from a running flow to `authenticated`/`user_id`/
    /// `auth_token`/`phone`/`module`/`location`, since the engine itself
    /// only ever sees `FlowContext`).
    pub fn merge_session(&mut self, patch: &Value) {
        let Some(patch_obj) = patch.as_object() else { return };
        let existing = self
            .variables
            .entry("session".to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !existing.is_object() {
            *existing = Value::Object(serde_json::Map::new());
        }
        let map = existing.as_object_mut().expect("just ensured object");
        for (k, v) in patch_obj {
            map.insert(k.clone(), v.clone());
        }
        self.touch();
    }

    pub fn fail(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.last_error = Some(LastError {
            kind: kind.into(),
            message: message.into(),
            state: self.current_state.clone(),
        });
        self.status = RunStatus::Failed;
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled | RunStatus::Abandoned
        )
    }

    /// Read-only interpolation view: `variables`, then `collected_data`,
    /// layered (variables take precedence on key collision).
    pub fn interpolation_view(&self) -> Value {
        let mut merged = self.collected_data.clone();
        for (k, v) in &self.variables {
            merged.insert(k.clone(), v.clone());
        }
        Value::Object(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_state_appends_history_and_tracks_previous() {
        let mut ctx = FlowContext::new("f1", 1, "sess-1", "start");
        ctx.enter_state("middle");
        ctx.enter_state("end");
        assert_eq!(ctx.state_history, vec!["start", "middle", "end"]);
        assert_eq!(ctx.previous_state.as_deref(), Some("middle"));
        assert_eq!(ctx.current_state, "end");
    }

    #[test]
    fn state_history_is_capped() {
        let mut ctx = FlowContext::new("f1", 1, "sess-1", "start");
        for i in 0..(MAX_STATE_HISTORY + 10) {
            ctx.enter_state(format!("s{i}"));
        }
        assert_eq!(ctx.state_history.len(), MAX_STATE_HISTORY);
    }

    #[test]
    fn merge_session_accumulates_across_calls() {
        let mut ctx = FlowContext::new("f1", 1, "sess-1", "start");
        ctx.merge_session(&serde_json::json!({"authenticated": true}));
        ctx.merge_session(&serde_json::json!({"user_id": "u1"}));
        let session = ctx.variables.get("session").unwrap();
        assert_eq!(session["authenticated"], true);
        assert_eq!(session["user_id"], "u1");
    }
}
