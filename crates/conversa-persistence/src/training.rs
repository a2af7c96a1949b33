use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::instrument;

use crate::error::Result;
use crate::types::TrainingSampleRow;

/// `training_samples` store (§3.5/§6.6) — fed by the conversation pipeline
/// (every classified user turn is a candidate training sample) and by the
/// game/admin collaborators named in §3.5 (outside this crate's scope; it
/// only owns the `source` column's vocabulary).
pub struct TrainingSampleStore {
    db: Mutex<Connection>,
}

impl TrainingSampleStore {
    pub fn new(conn: Connection) -> Arc<Self> {
        Arc::new(Self { db: Mutex::new(conn) })
    }

    #[instrument(skip(self, entities), fields(intent, source))]
    pub fn append(
        &self,
        text: &str,
        intent: &str,
        entities: Value,
        language: Option<&str>,
        confidence: f64,
        source: &str,
    ) -> Result<i64> {
        // High-confidence classifications need no human review; the rest
        // enter the review queue (admin-only review is the default posture
        // for anything the model itself wasn't confident about).
        let review_status = if confidence >= 0.95 { "auto_approved" } else { "pending" };
        let now = conversa_core::now_rfc3339();
        let entities_json = serde_json::to_string(&entities)?;

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO training_samples
             (text, intent, entities, language, confidence, source, review_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![text, intent, entities_json, language, confidence, source, review_status, now],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub fn pending_review(&self, limit: usize) -> Result<Vec<TrainingSampleRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, text, intent, entities, language, confidence, source, review_status, created_at
             FROM training_samples
             WHERE review_status = 'pending'
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_sample)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

fn row_to_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrainingSampleRow> {
    let entities_json: String = row.get(3)?;
    Ok(TrainingSampleRow {
        id: row.get(0)?,
        text: row.get(1)?,
        intent: row.get(2)?,
        entities: serde_json::from_str(&entities_json).unwrap_or(Value::Null),
        language: row.get(4)?,
        confidence: row.get(5)?,
        source: row.get(6)?,
        review_status: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn low_confidence_sample_enters_review_queue() {
        let store = TrainingSampleStore::new(open());
        store.append("order pizza", "order_food", json!([]), Some("en"), 0.6, "conversation").unwrap();
        let pending = store.pending_review(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].review_status, "pending");
    }

    #[test]
    fn high_confidence_sample_auto_approves() {
        let store = TrainingSampleStore::new(open());
        store.append("hi", "greeting", json!([]), Some("en"), 0.98, "conversation").unwrap();
        assert!(store.pending_review(10).unwrap().is_empty());
    }
}
