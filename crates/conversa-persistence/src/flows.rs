use std::sync::{Arc, Mutex};

use conversa_flow::FlowDefinition;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::error::{PersistenceError, Result};

/// Flow Definition Store (§2 component 7 / §6.6): loads flow JSON from the
/// `flows` table by trigger/intent/module, validates it (§3.2 invariants),
/// and caches parsed definitions in a read-mostly `DashMap` keyed by `id`,
/// invalidated on version bump — "read-mostly... updates invalidate by
/// version" (§5).
pub struct FlowDefinitionStore {
    db: Mutex<Connection>,
    cache: DashMap<String, Arc<FlowDefinition>>,
}

impl FlowDefinitionStore {
    pub fn new(conn: Connection) -> Arc<Self> {
        Arc::new(Self {
            db: Mutex::new(conn),
            cache: DashMap::new(),
        })
    }

    /// Load-or-upsert a flow definition (idempotent by `id` + `version`,
    /// per the admin CLI contract in §6.7). Validates before writing —
    /// `SchemaError` refuses the load entirely (§7).
    #[instrument(skip(self, flow), fields(id = %flow.id, version = flow.version))]
    pub fn upsert(&self, flow: &FlowDefinition) -> Result<()> {
        flow.validate()?;

        let definition = serde_json::to_string(flow)?;
        let now = conversa_core::now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO flows (id, version, name, module, trigger, definition, enabled, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id, version) DO UPDATE SET
                name = excluded.name,
                module = excluded.module,
                trigger = excluded.trigger,
                definition = excluded.definition,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
            params![
                flow.id,
                flow.version,
                flow.name,
                flow.module,
                flow.trigger,
                definition,
                flow.enabled,
                now,
            ],
        )?;
        self.cache.remove(&flow.id);
        info!("flow definition upserted");
        Ok(())
    }

    /// Fetch by `id`, preferring the cache; on miss, load the
    /// highest-version row for that `id` from the DB and cache it.
    pub fn get(&self, id: &str) -> Result<Option<Arc<FlowDefinition>>> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(Some(cached.clone()));
        }

        let db = self.db.lock().unwrap();
        let row: Option<String> = db
            .query_row(
                "SELECT definition FROM flows WHERE id = ?1 ORDER BY version DESC LIMIT 1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        drop(db);

        match row {
            Some(json) => {
                let flow: FlowDefinition = serde_json::from_str(&json)?;
                let flow = Arc::new(flow);
                self.cache.insert(id.to_string(), flow.clone());
                Ok(Some(flow))
            }
            None => Ok(None),
        }
    }

    /// Resolve every enabled flow whose `trigger` matches `intent`, applying
    /// the tie-break from §4.6: highest `version`, then lexicographically
    /// greatest `id`. Returns the single winner, if any.
    #[instrument(skip(self))]
    pub fn resolve_trigger(&self, intent: &str) -> Result<Option<Arc<FlowDefinition>>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, version FROM flows
             WHERE trigger = ?1 AND enabled = 1
             ORDER BY version DESC, id DESC",
        )?;
        let mut rows = stmt.query(params![intent])?;
        let winner: Option<(String, u32)> = match rows.next()? {
            Some(row) => Some((row.get(0)?, row.get(1)?)),
            None => None,
        };
        drop(rows);
        drop(stmt);
        drop(db);

        match winner {
            Some((id, _version)) => {
                debug!(id = %id, intent, "resolved trigger to flow");
                self.get(&id)
            }
            None => Ok(None),
        }
    }

    /// List flow ids (with name/module/trigger/enabled/version), optionally
    /// filtered, for `flows list [--module X] [--enabled]` (§6.7).
    pub fn list(&self, module: Option<&str>, enabled_only: bool) -> Result<Vec<FlowSummary>> {
        let db = self.db.lock().unwrap();
        // Keep only the highest version per id (distinct flows, not every
        // historical version row).
        let mut stmt = db.prepare(
            "SELECT f.id, f.version, f.name, f.module, f.trigger, f.enabled
             FROM flows f
             INNER JOIN (SELECT id, MAX(version) AS max_version FROM flows GROUP BY id) m
                ON f.id = m.id AND f.version = m.max_version
             ORDER BY f.module, f.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FlowSummary {
                id: row.get(0)?,
                version: row.get(1)?,
                name: row.get(2)?,
                module: row.get(3)?,
                trigger: row.get(4)?,
                enabled: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            let row = row?;
            if let Some(m) = module {
                if row.module != m {
                    continue;
                }
            }
            if enabled_only && !row.enabled {
                continue;
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Flip `enabled` for the highest version of `id` (`flows toggle <id>`,
    /// §6.7). Returns the new enabled state.
    #[instrument(skip(self))]
    pub fn toggle(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let version: Option<u32> = db
            .query_row(
                "SELECT version FROM flows WHERE id = ?1 ORDER BY version DESC LIMIT 1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let version = version.ok_or_else(|| PersistenceError::FlowNotFound { id: id.to_string() })?;

        let now = conversa_core::now_rfc3339();
        db.execute(
            "UPDATE flows SET enabled = NOT enabled, updated_at = ?1 WHERE id = ?2 AND version = ?3",
            params![now, id, version],
        )?;
        let new_state: bool = db.query_row(
            "SELECT enabled FROM flows WHERE id = ?1 AND version = ?2",
            params![id, version],
            |row| row.get(0),
        )?;
        drop(db);
        self.cache.remove(id);
        info!(enabled = new_state, "flow toggled");
        Ok(new_state)
    }
}

#[derive(Debug, Clone)]
pub struct FlowSummary {
    pub id: String,
    pub version: u32,
    pub name: String,
    pub module: String,
    pub trigger: Option<String>,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use conversa_flow::{ActionSpec, StateDefinition, StateType};
    use std::collections::{HashMap, HashSet};

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        conn
    }

    fn sample_flow(id: &str, trigger: &str, version: u32) -> FlowDefinition {
        let mut states = HashMap::new();
        states.insert(
            "start".to_string(),
            StateDefinition {
                state_type: StateType::Action,
                actions: vec![ActionSpec {
                    id: None,
                    executor: "response".to_string(),
                    config: serde_json::json!({"text": "hi"}),
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
            id: id.to_string(),
            name: "Sample".to_string(),
            description: String::new(),
            module: "general".to_string(),
            trigger: Some(trigger.to_string()),
            states,
            initial_state: "start".to_string(),
            final_states: ["done".to_string()].into(),
            enabled: true,
            version,
            requires_auth: false,
        }
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let store = FlowDefinitionStore::new(open());
        let flow = sample_flow("greeting_v1", "greeting", 1);
        store.upsert(&flow).unwrap();
        let got = store.get("greeting_v1").unwrap().unwrap();
        assert_eq!(got.id, "greeting_v1");
        assert_eq!(got.trigger.as_deref(), Some("greeting"));
    }

    #[test]
    fn resolve_trigger_picks_highest_version_on_tie() {
        let store = FlowDefinitionStore::new(open());
        store.upsert(&sample_flow("food_order_v1", "order_food", 1)).unwrap();
        store.upsert(&sample_flow("food_order_v2", "order_food", 2)).unwrap();
        let got = store.resolve_trigger("order_food").unwrap().unwrap();
        assert_eq!(got.id, "food_order_v2");
    }

    #[test]
    fn resolve_trigger_ignores_disabled_flows() {
        let store = FlowDefinitionStore::new(open());
        let mut disabled = sample_flow("promo_v1", "promo", 1);
        disabled.enabled = false;
        store.upsert(&disabled).unwrap();
        assert!(store.resolve_trigger("promo").unwrap().is_none());
    }

    #[test]
    fn invalid_flow_is_rejected() {
        let store = FlowDefinitionStore::new(open());
        let mut bad = sample_flow("bad_v1", "bad", 1);
        bad.initial_state = "missing".to_string();
        assert!(store.upsert(&bad).is_err());
    }

    #[test]
    fn toggle_flips_enabled_and_invalidates_cache() {
        let store = FlowDefinitionStore::new(open());
        store.upsert(&sample_flow("promo_v1", "promo", 1)).unwrap();
        assert!(store.get("promo_v1").unwrap().unwrap().enabled);
        let new_state = store.toggle("promo_v1").unwrap();
        assert!(!new_state);
        assert!(!store.get("promo_v1").unwrap().unwrap().enabled);
    }

    #[test]
    fn list_filters_by_module_and_enabled() {
        let store = FlowDefinitionStore::new(open());
        store.upsert(&sample_flow("a_v1", "a", 1)).unwrap();
        let mut b = sample_flow("b_v1", "b", 1);
        b.module = "food".to_string();
        store.upsert(&b).unwrap();
        let all = store.list(None, false).unwrap();
        assert_eq!(all.len(), 2);
        let food = store.list(Some("food"), false).unwrap();
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].id, "b_v1");
    }
}
