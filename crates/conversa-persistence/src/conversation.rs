use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::instrument;

use crate::error::Result;
use crate::types::ConversationMessageRow;

/// Append-only `conversation_messages` log (§3.4/§6.6), owned exclusively by
/// the Persistence layer.
pub struct ConversationLog {
    db: Mutex<Connection>,
}

#[derive(Debug, Clone, Default)]
pub struct NewMessage<'a> {
    pub session_id: &'a str,
    pub recipient_id: &'a str,
    pub role: &'a str,
    pub content: &'a str,
    pub intent: Option<&'a str>,
    pub confidence: Option<f64>,
    pub entities: Option<Value>,
    pub routing_decision: Option<&'a str>,
    pub processing_ms: Option<i64>,
}

impl ConversationLog {
    pub fn new(conn: Connection) -> Arc<Self> {
        Arc::new(Self { db: Mutex::new(conn) })
    }

    /// Append one turn. `turn_number` is assigned as `1 + max(turn_number)`
    /// for the session, under the same lock as the insert, so concurrent
    /// appends for different sessions never contend and appends for the
    /// same session (already serialized by the per-recipient lock, §5)
    /// never race.
    #[instrument(skip(self, msg), fields(session_id = %msg.session_id, role = %msg.role))]
    pub fn append(&self, msg: NewMessage<'_>) -> Result<i64> {
        let now = conversa_core::now_rfc3339();
        let entities = msg
            .entities
            .map(|v| serde_json::to_string(&v))
            .transpose()?;

        let db = self.db.lock().unwrap();
        let next_turn: i64 = db.query_row(
            "SELECT COALESCE(MAX(turn_number), 0) + 1 FROM conversation_messages WHERE session_id = ?1",
            params![msg.session_id],
            |row| row.get(0),
        )?;
        db.execute(
            "INSERT INTO conversation_messages
             (session_id, recipient_id, role, content, intent, confidence, entities,
              turn_number, routing_decision, processing_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                msg.session_id,
                msg.recipient_id,
                msg.role,
                msg.content,
                msg.intent,
                msg.confidence,
                entities,
                next_turn,
                msg.routing_decision,
                msg.processing_ms,
                now,
            ],
        )?;
        Ok(next_turn)
    }

    /// Last `limit` turns for a session, oldest first — used to verify
    /// per-recipient linearizability (§8 invariant 1) and to reconstruct
    /// short-term context.
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ConversationMessageRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, recipient_id, role, content, intent, confidence,
                    entities, turn_number, routing_decision, processing_ms, created_at
             FROM conversation_messages
             WHERE session_id = ?1
             ORDER BY turn_number DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], row_to_message)?;
        let mut out: Vec<_> = rows.collect::<rusqlite::Result<_>>()?;
        out.reverse();
        Ok(out)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMessageRow> {
    let entities_json: Option<String> = row.get(7)?;
    Ok(ConversationMessageRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        recipient_id: row.get(2)?,
        role: row.get(3)?,
        content: row.get(4)?,
        intent: row.get(5)?,
        confidence: row.get(6)?,
        entities: entities_json.and_then(|s| serde_json::from_str(&s).ok()),
        turn_number: row.get(8)?,
        routing_decision: row.get(9)?,
        processing_ms: row.get(10)?,
        created_at: row.get(11)?,
    })
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
    fn turn_numbers_increment_per_session() {
        let log = ConversationLog::new(open());
        let t1 = log
            .append(NewMessage {
                session_id: "s1",
                recipient_id: "web-1",
                role: "user",
                content: "hi",
                ..Default::default()
            })
            .unwrap();
        let t2 = log
            .append(NewMessage {
                session_id: "s1",
                recipient_id: "web-1",
                role: "assistant",
                content: "hello!",
                ..Default::default()
            })
            .unwrap();
        assert_eq!(t1, 1);
        assert_eq!(t2, 2);
    }

    #[test]
    fn recent_returns_oldest_first() {
        let log = ConversationLog::new(open());
        for i in 0..3 {
            log.append(NewMessage {
                session_id: "s1",
                recipient_id: "web-1",
                role: "user",
                content: "turn",
                ..Default::default()
            })
            .unwrap();
            let _ = i;
        }
        let rows = log.recent("s1", 10).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].turn_number, 1);
        assert_eq!(rows[2].turn_number, 3);
    }
}
