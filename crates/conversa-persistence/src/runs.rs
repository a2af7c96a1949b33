use std::sync::{Arc, Mutex};

use conversa_flow::FlowContext;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::Result;

/// Persists [`FlowContext`] rows to `flow_runs` (§6.6), upsert-by-run-id —
/// "Persistence is... upsert-by-run-id for flow runs" (§5).
pub struct FlowRunStore {
    db: Mutex<Connection>,
}

impl FlowRunStore {
    pub fn new(conn: Connection) -> Arc<Self> {
        Arc::new(Self { db: Mutex::new(conn) })
    }

    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub fn save(&self, ctx: &FlowContext) -> Result<()> {
        let context_json = serde_json::to_string(ctx)?;
        let status = serde_json::to_value(ctx.status)?
            .as_str()
            .unwrap_or("running")
            .to_string();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO flow_runs (run_id, flow_id, session_id, current_state, context, status, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(run_id) DO UPDATE SET
                current_state = excluded.current_state,
                context = excluded.context,
                status = excluded.status,
                updated_at = excluded.updated_at",
            params![
                ctx.run_id.as_str(),
                ctx.flow_id,
                ctx.session_id,
                ctx.current_state,
                context_json,
                status,
                ctx.started_at,
                ctx.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn load(&self, run_id: &str) -> Result<Option<FlowContext>> {
        let db = self.db.lock().unwrap();
        let json: Option<String> = db
            .query_row(
                "SELECT context FROM flow_runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        drop(db);
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    /// The single in-flight (running or suspended) run for a session, if
    /// any — used by the Conversation Service to decide between
    /// `FlowEngine.resume` and `IntentRouter.route` (§2).
    pub fn in_flight_for_session(&self, session_id: &str) -> Result<Option<FlowContext>> {
        let db = self.db.lock().unwrap();
        let json: Option<String> = db
            .query_row(
                "SELECT context FROM flow_runs
                 WHERE session_id = ?1 AND status IN ('running', 'suspended')
                 ORDER BY updated_at DESC LIMIT 1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        drop(db);
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    /// Mark a suspended run `abandoned` on TTL detection (§8 boundary
    /// behavior 11).
    pub fn mark_abandoned(&self, run_id: &str) -> Result<()> {
        let now = conversa_core::now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE flow_runs SET status = 'abandoned', updated_at = ?1 WHERE run_id = ?2",
            params![now, run_id],
        )?;
        Ok(())
    }

    /// Every `suspended` run whose governing `input` state's
    /// `timeout_seconds` has elapsed — polled by the engine's timeout
    /// tick-loop (§4.5).
    pub fn suspended_before(&self, cutoff_rfc3339: &str) -> Result<Vec<FlowContext>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT context FROM flow_runs WHERE status = 'suspended' AND updated_at < ?1",
        )?;
        let rows = stmt.query_map(params![cutoff_rfc3339], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn save_then_load_roundtrips() {
        let store = FlowRunStore::new(open());
        let ctx = FlowContext::new("f1", 1, "sess-1", "start");
        store.save(&ctx).unwrap();
        let loaded = store.load(ctx.run_id.as_str()).unwrap().unwrap();
        assert_eq!(loaded.run_id, ctx.run_id);
        assert_eq!(loaded.current_state, "start");
    }

    #[test]
    fn in_flight_for_session_finds_running_run() {
        let store = FlowRunStore::new(open());
        let ctx = FlowContext::new("f1", 1, "sess-1", "start");
        store.save(&ctx).unwrap();
        let found = store.in_flight_for_session("sess-1").unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn mark_abandoned_removes_from_in_flight() {
        let store = FlowRunStore::new(open());
        let ctx = FlowContext::new("f1", 1, "sess-1", "start");
        store.save(&ctx).unwrap();
        store.mark_abandoned(ctx.run_id.as_str()).unwrap();
        assert!(store.in_flight_for_session("sess-1").unwrap().is_none());
    }
}
