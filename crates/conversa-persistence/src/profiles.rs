use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::instrument;

use crate::error::Result;
use crate::types::UserProfileRow;

/// Cooldown window for preference confirmation questions (§4.8, §8
/// invariant 6): "no confirmation question is asked twice within 24h for
/// the same `(user_id, key)`".
pub const QUESTION_COOLDOWN_HOURS: i64 = 24;

/// `user_profiles` store (§3.6/§6.6) plus the `preference_questions`
/// cooldown ledger that backs §4.8's per-question cooldown. Owned
/// exclusively by the Preference Enricher (§3.7: "Preferences: owned by
/// Preference Enricher; written only by it; read widely") — this crate
/// only provides the storage primitives; the confidence-tier policy lives
/// in `conversa-preferences`.
pub struct UserProfileStore {
    db: Mutex<Connection>,
}

impl UserProfileStore {
    pub fn new(conn: Connection) -> Arc<Self> {
        Arc::new(Self { db: Mutex::new(conn) })
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserProfileRow>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT user_id, attrs, profile_completeness, updated_at FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            row_to_profile,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Write the full `attrs` blob and recomputed `profile_completeness`
    /// (upsert). The caller (the enricher) owns reading the old blob,
    /// merging in new attributes, and computing completeness — this store
    /// does no merge logic of its own.
    #[instrument(skip(self, attrs), fields(user_id))]
    pub fn put(&self, user_id: &str, attrs: &Value, profile_completeness: f64) -> Result<()> {
        let attrs_json = serde_json::to_string(attrs)?;
        let now = conversa_core::now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO user_profiles (user_id, attrs, profile_completeness, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                attrs = excluded.attrs,
                profile_completeness = excluded.profile_completeness,
                updated_at = excluded.updated_at",
            params![user_id, attrs_json, profile_completeness, now],
        )?;
        Ok(())
    }

    /// Whether a confirmation question for `(user_id, key)` was asked
    /// within the cooldown window.
    pub fn was_asked_recently(&self, user_id: &str, key: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let asked_at: Option<String> = db
            .query_row(
                "SELECT asked_at FROM preference_questions WHERE user_id = ?1 AND pref_key = ?2",
                params![user_id, key],
                |row| row.get(0),
            )
            .optional()?;
        drop(db);

        let Some(asked_at) = asked_at else { return Ok(false) };
        let Ok(asked_at) = chrono::DateTime::parse_from_rfc3339(&asked_at) else {
            return Ok(false);
        };
        let age = chrono::Utc::now().signed_duration_since(asked_at.with_timezone(&chrono::Utc));
        Ok(age < chrono::Duration::hours(QUESTION_COOLDOWN_HOURS))
    }

    /// Record that a confirmation question for `(user_id, key)` was just
    /// asked, resetting the cooldown clock.
    pub fn record_question_asked(&self, user_id: &str, key: &str) -> Result<()> {
        let now = conversa_core::now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO preference_questions (user_id, pref_key, asked_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, pref_key) DO UPDATE SET asked_at = excluded.asked_at",
            params![user_id, key, now],
        )?;
        Ok(())
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfileRow> {
    let attrs_json: String = row.get(1)?;
    Ok(UserProfileRow {
        user_id: row.get(0)?,
        attrs: serde_json::from_str(&attrs_json).unwrap_or(Value::Object(Default::default())),
        profile_completeness: row.get(2)?,
        updated_at: row.get(3)?,
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
    fn put_then_get_roundtrips() {
        let store = UserProfileStore::new(open());
        store.put("u1", &json!({"dietary": {"dietary_type": "veg"}}), 12.5).unwrap();
        let got = store.get("u1").unwrap().unwrap();
        assert_eq!(got.profile_completeness, 12.5);
        assert_eq!(got.attrs["dietary"]["dietary_type"], "veg");
    }

    #[test]
    fn missing_profile_returns_none() {
        let store = UserProfileStore::new(open());
        assert!(store.get("nobody").unwrap().is_none());
    }

    #[test]
    fn question_cooldown_gates_repeat_asks() {
        let store = UserProfileStore::new(open());
        assert!(!store.was_asked_recently("u1", "spice_level").unwrap());
        store.record_question_asked("u1", "spice_level").unwrap();
        assert!(store.was_asked_recently("u1", "spice_level").unwrap());
    }
}
