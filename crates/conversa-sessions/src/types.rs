use std::collections::HashMap;

use conversa_core::{now_rfc3339, Platform};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bound on `conversation_history` kept in the session scratch bag (§3.1).
pub const MAX_HISTORY_TURNS: usize = 20;

/// A stashed intent recorded before detouring to authentication (§4.6),
/// replayed once the detour's flow reaches its `success` terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingIntent {
    pub intent: String,
    #[serde(default)]
    pub entities: Value,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// One turn in the bounded `conversation_history` scratch, used as short-term
/// context for prompt assembly — distinct from the durable, append-only
/// `conversation_messages` log owned by the persistence layer (§3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Per-recipient state bag (§3.1). Backed by a flat `HashMap<String, Value>`
/// scratch, matching the spec's "mapping from string keys to values", with
/// typed accessors layered over the required/optional keys it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub recipient_id: String,
    pub data: HashMap<String, Value>,
}

impl Session {
    pub fn new(recipient_id: impl Into<String>, platform: Platform) -> Self {
        let now = now_rfc3339();
        let mut data = HashMap::new();
        data.insert("platform".to_string(), Value::String(platform.to_string()));
        data.insert("created_at".to_string(), Value::String(now.clone()));
        data.insert("last_active_at".to_string(), Value::String(now));
        Self {
            recipient_id: recipient_id.into(),
            data,
        }
    }

    pub fn platform(&self) -> Option<Platform> {
        self.data
            .get("platform")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn set_platform(&mut self, platform: Platform) {
        self.data
            .insert("platform".to_string(), Value::String(platform.to_string()));
    }

    pub fn user_id(&self) -> Option<&str> {
        self.data.get("user_id").and_then(Value::as_str)
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.data
            .insert("user_id".to_string(), Value::String(user_id.into()));
    }

    pub fn authenticated(&self) -> bool {
        self.data
            .get("authenticated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.data
            .insert("authenticated".to_string(), Value::Bool(authenticated));
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.data.get("auth_token").and_then(Value::as_str)
    }

    pub fn set_auth_token(&mut self, auth_token: impl Into<String>) {
        self.data
            .insert("auth_token".to_string(), Value::String(auth_token.into()));
    }

    pub fn phone(&self) -> Option<&str> {
        self.data.get("phone").and_then(Value::as_str)
    }

    pub fn set_phone(&mut self, phone: impl Into<String>) {
        self.data.insert("phone".to_string(), Value::String(phone.into()));
    }

    pub fn module(&self) -> Option<&str> {
        self.data.get("module").and_then(Value::as_str)
    }

    pub fn set_module(&mut self, module: impl Into<String>) {
        self.data
            .insert("module".to_string(), Value::String(module.into()));
    }

    pub fn pending_intent(&self) -> Option<PendingIntent> {
        self.data
            .get("pending_intent")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_pending_intent(&mut self, pending: &PendingIntent) {
        self.data.insert(
            "pending_intent".to_string(),
            serde_json::to_value(pending).expect("PendingIntent serializes"),
        );
    }

    pub fn clear_pending_intent(&mut self) {
        self.data.remove("pending_intent");
    }

    pub fn location(&self) -> Option<Location> {
        self.data
            .get("location")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_location(&mut self, location: Location) {
        self.data.insert(
            "location".to_string(),
            serde_json::to_value(location).expect("Location serializes"),
        );
        self.data
            .insert("location_saved".to_string(), Value::Bool(true));
    }

    pub fn conversation_history(&self) -> Vec<HistoryTurn> {
        self.data
            .get("conversation_history")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Append a turn, keeping only the last [`MAX_HISTORY_TURNS`] (§3.1:
    /// "bounded list of last N turns").
    pub fn push_history(&mut self, role: impl Into<String>, content: impl Into<String>) {
        let mut history = self.conversation_history();
        history.push(HistoryTurn {
            role: role.into(),
            content: content.into(),
        });
        if history.len() > MAX_HISTORY_TURNS {
            let excess = history.len() - MAX_HISTORY_TURNS;
            history.drain(0..excess);
        }
        self.data.insert(
            "conversation_history".to_string(),
            serde_json::to_value(history).expect("history serializes"),
        );
    }

    /// In-flight flow run id, if any (the conversation service looks this up
    /// to decide between `FlowEngine.resume` and `IntentRouter.route`, §2).
    pub fn active_run_id(&self) -> Option<&str> {
        self.data.get("active_run_id").and_then(Value::as_str)
    }

    pub fn set_active_run_id(&mut self, run_id: impl Into<String>) {
        self.data
            .insert("active_run_id".to_string(), Value::String(run_id.into()));
    }

    pub fn clear_active_run_id(&mut self) {
        self.data.remove("active_run_id");
    }

    pub fn last_active_at(&self) -> Option<&str> {
        self.data.get("last_active_at").and_then(Value::as_str)
    }

    pub fn touch(&mut self) {
        self.data.insert(
            "last_active_at".to_string(),
            Value::String(now_rfc3339()),
        );
    }

    /// Full `category.key` of a preference confirmation question currently
    /// awaiting the user's yes/no reply (§4.8 step 3), if any. The next
    /// inbound message is checked against this before normal routing.
    pub fn pending_preference_confirmation(&self) -> Option<String> {
        self.data
            .get("pending_preference_confirmation")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn set_pending_preference_confirmation(&mut self, full_key: impl Into<String>) {
        self.data.insert(
            "pending_preference_confirmation".to_string(),
            Value::String(full_key.into()),
        );
    }

    pub fn clear_pending_preference_confirmation(&mut self) {
        self.data.remove("pending_preference_confirmation");
    }

    /// Scratch namespace per spec §3.1 "flow_data" — writable by flow
    /// executors without colliding with the typed session keys above.
    pub fn flow_data(&self) -> Value {
        self.data
            .get("flow_data")
            .cloned()
            .unwrap_or(Value::Object(Default::default()))
    }

    pub fn set_flow_data(&mut self, value: Value) {
        self.data.insert("flow_data".to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_required_keys() {
        let s = Session::new("web-1", Platform::Web);
        assert_eq!(s.platform(), Some(Platform::Web));
        assert!(s.data.contains_key("created_at"));
        assert!(s.data.contains_key("last_active_at"));
        assert!(!s.authenticated());
    }

    #[test]
    fn pending_intent_roundtrips() {
        let mut s = Session::new("wa-1", Platform::Whatsapp);
        let pending = PendingIntent {
            intent: "order_food".to_string(),
            entities: Value::Null,
            text: "order pizza".to_string(),
        };
        s.set_pending_intent(&pending);
        let got = s.pending_intent().unwrap();
        assert_eq!(got.intent, "order_food");
        assert_eq!(got.text, "order pizza");
        s.clear_pending_intent();
        assert!(s.pending_intent().is_none());
    }

    #[test]
    fn auth_fields_roundtrip() {
        let mut s = Session::new("wa-1", Platform::Whatsapp);
        assert!(!s.authenticated());
        s.set_authenticated(true);
        s.set_user_id("u1");
        s.set_auth_token("tok-abc");
        s.set_phone("+919999999999");
        assert!(s.authenticated());
        assert_eq!(s.user_id(), Some("u1"));
        assert_eq!(s.auth_token(), Some("tok-abc"));
        assert_eq!(s.phone(), Some("+919999999999"));
    }

    #[test]
    fn pending_preference_confirmation_roundtrips() {
        let mut s = Session::new("web-1", Platform::Web);
        assert!(s.pending_preference_confirmation().is_none());
        s.set_pending_preference_confirmation("dietary.spice_level");
        assert_eq!(s.pending_preference_confirmation().as_deref(), Some("dietary.spice_level"));
        s.clear_pending_preference_confirmation();
        assert!(s.pending_preference_confirmation().is_none());
    }

    #[test]
    fn history_is_bounded() {
        let mut s = Session::new("web-1", Platform::Web);
        for i in 0..(MAX_HISTORY_TURNS + 5) {
            s.push_history("user", format!("turn {i}"));
        }
        assert_eq!(s.conversation_history().len(), MAX_HISTORY_TURNS);
        // oldest turns dropped, newest retained
        let last = s.conversation_history().pop().unwrap();
        assert_eq!(last.content, format!("turn {}", MAX_HISTORY_TURNS + 4));
    }
}
