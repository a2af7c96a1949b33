use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};

/// A directed-graph flow definition (§3.2). One row per version; the store
/// keys on `id` and keeps only the highest enabled `version` live for a
/// given trigger (tie-break in §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub module: String,
    pub trigger: Option<String>,
    pub states: HashMap<String, StateDefinition>,
    pub initial_state: String,
    pub final_states: HashSet<String>,
    pub enabled: bool,
    pub version: u32,
    /// Whether entering this flow requires `session.authenticated` (§4.6
    /// step 4). Flows without a protected action leave this `false`.
    #[serde(default)]
    pub requires_auth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    Action,
    Input,
    Decision,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDefinition {
    #[serde(rename = "type")]
    pub state_type: StateType,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub transitions: HashMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub on_enter: Vec<ActionSpec>,
    #[serde(default)]
    pub on_exit: Vec<ActionSpec>,
}

/// `{ if: expression, then: target_state_name }`, evaluated in order on
/// entry, before transitions. First match wins (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "if")]
    pub if_expr: String,
    pub then: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Stable id for this action within its state — used as the key under
    /// which its `output` is merged into `context.variables` (§4.4).
    #[serde(default)]
    pub id: Option<String>,
    pub executor: String,
    #[serde(default)]
    pub config: Value,
    pub on_success: Option<String>,
    pub on_error: Option<String>,
}

impl ActionSpec {
    /// Key under which this action's output is merged into `variables` —
    /// falls back to the executor name when no explicit id is given.
    pub fn output_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.executor)
    }
}

impl FlowDefinition {
    /// Validate the structural invariants from §3.2:
    /// - every transition/condition target names a defined state
    /// - `final_states` is a subset of `states` where each has `type = end`
    /// - `initial_state` is defined and is not a final state
    pub fn validate(&self) -> Result<()> {
        if !self.states.contains_key(&self.initial_state) {
            return Err(FlowError::Schema(format!(
                "initial_state '{}' is not a defined state",
                self.initial_state
            )));
        }
        if self.final_states.contains(&self.initial_state) {
            return Err(FlowError::Schema(format!(
                "initial_state '{}' must not be a final state",
                self.initial_state
            )));
        }

        for final_name in &self.final_states {
            match self.states.get(final_name) {
                None => {
                    return Err(FlowError::Schema(format!(
                        "final_states entry '{final_name}' is not a defined state"
                    )))
                }
                Some(state) if state.state_type != StateType::End => {
                    return Err(FlowError::Schema(format!(
                        "final state '{final_name}' must have type 'end'"
                    )))
                }
                _ => {}
            }
        }

        for (name, state) in &self.states {
            for (event, target) in &state.transitions {
                if !self.states.contains_key(target) {
                    return Err(FlowError::Schema(format!(
                        "state '{name}' transition on '{event}' targets undefined state '{target}'"
                    )));
                }
            }
            for cond in &state.conditions {
                if !self.states.contains_key(&cond.then) {
                    return Err(FlowError::Schema(format!(
                        "state '{name}' condition targets undefined state '{}'",
                        cond.then
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<&StateDefinition> {
        self.states.get(name)
    }

    pub fn is_final(&self, name: &str) -> bool {
        self.final_states.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_flow() -> FlowDefinition {
        let mut states = HashMap::new();
        states.insert(
            "start".to_string(),
            StateDefinition {
                state_type: StateType::Action,
                actions: vec![],
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
            id: "test_v1".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            module: "general".to_string(),
            trigger: Some("test".to_string()),
            states,
            initial_state: "start".to_string(),
            final_states: ["done".to_string()].into(),
            enabled: true,
            version: 1,
            requires_auth: false,
        }
    }

    #[test]
    fn valid_flow_passes() {
        assert!(base_flow().validate().is_ok());
    }

    #[test]
    fn undefined_initial_state_fails() {
        let mut f = base_flow();
        f.initial_state = "missing".to_string();
        assert!(f.validate().is_err());
    }

    #[test]
    fn transition_to_undefined_state_fails() {
        let mut f = base_flow();
        f.states
            .get_mut("start")
            .unwrap()
            .transitions
            .insert("error".to_string(), "nowhere".to_string());
        assert!(f.validate().is_err());
    }

    #[test]
    fn final_state_must_be_type_end() {
        let mut f = base_flow();
        f.states.get_mut("done").unwrap().state_type = StateType::Action;
        assert!(f.validate().is_err());
    }

    #[test]
    fn initial_state_cannot_be_final() {
        let mut f = base_flow();
        f.final_states.insert("start".to_string());
        assert!(f.validate().is_err());
    }
}
