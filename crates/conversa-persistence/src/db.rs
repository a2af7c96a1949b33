use rusqlite::Connection;

use crate::error::Result;

/// Initialise every relational table from §6.6. Safe to call on every
/// startup — `CREATE TABLE IF NOT EXISTS` throughout, matching the
/// teacher's `init_db` idiom.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_flows_table(conn)?;
    create_flow_runs_table(conn)?;
    create_conversation_messages_table(conn)?;
    create_training_samples_table(conn)?;
    create_user_profiles_table(conn)?;
    create_preference_questions_table(conn)?;
    Ok(())
}

/// `flows(id, version, name, module, trigger, states jsonb, initial_state,
/// final_states jsonb, enabled, updated_at)` — PK `(id)` with `version`
/// monotonic (§6.6). The full definition (including `initial_state` and
/// `final_states`) is folded into the `definition` JSON column; `trigger`
/// and `module` are pulled out as real columns because the Flow Definition
/// Store needs to query on them directly.
fn create_flows_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS flows (
            id          TEXT NOT NULL,
            version     INTEGER NOT NULL,
            name        TEXT NOT NULL,
            module      TEXT NOT NULL,
            trigger     TEXT,
            definition  TEXT NOT NULL,
            enabled     INTEGER NOT NULL DEFAULT 1,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (id, version)
        );
        CREATE INDEX IF NOT EXISTS idx_flows_trigger
            ON flows(trigger, enabled);
        CREATE INDEX IF NOT EXISTS idx_flows_module
            ON flows(module);",
    )?;
    Ok(())
}

/// `flow_runs(run_id uuid PK, flow_id, session_id, current_state, context
/// jsonb, status, started_at, updated_at)` (§6.6). Upsert-by-run-id.
fn create_flow_runs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS flow_runs (
            run_id         TEXT PRIMARY KEY,
            flow_id        TEXT NOT NULL,
            session_id     TEXT NOT NULL,
            current_state  TEXT NOT NULL,
            context        TEXT NOT NULL,
            status         TEXT NOT NULL,
            started_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_flow_runs_session
            ON flow_runs(session_id, status);",
    )?;
    Ok(())
}

/// `conversation_messages(...)` indexed on `(session_id, turn_number)`
/// (§6.6). Append-only.
fn create_conversation_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversation_messages (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id        TEXT NOT NULL,
            recipient_id      TEXT NOT NULL,
            role              TEXT NOT NULL,
            content           TEXT NOT NULL,
            intent            TEXT,
            confidence        REAL,
            entities          TEXT,
            turn_number       INTEGER NOT NULL,
            routing_decision  TEXT,
            processing_ms     INTEGER,
            created_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conv_msgs_session_turn
            ON conversation_messages(session_id, turn_number);",
    )?;
    Ok(())
}

/// `training_samples(...)` (§3.5/§6.6).
fn create_training_samples_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS training_samples (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            text            TEXT NOT NULL,
            intent          TEXT NOT NULL,
            entities        TEXT NOT NULL DEFAULT '[]',
            language        TEXT,
            confidence      REAL NOT NULL,
            source          TEXT NOT NULL,
            review_status   TEXT NOT NULL DEFAULT 'pending',
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_training_review
            ON training_samples(review_status, created_at DESC);",
    )?;
    Ok(())
}

/// `user_profiles(user_id PK, attrs jsonb, profile_completeness,
/// updated_at)` (§3.6/§6.6).
fn create_user_profiles_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_profiles (
            user_id               TEXT PRIMARY KEY,
            attrs                 TEXT NOT NULL DEFAULT '{}',
            profile_completeness  REAL NOT NULL DEFAULT 0,
            updated_at            TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Ambient table (not named in spec.md §6.6, added to support §4.8's
/// 24-hour per-`(user_id, key)` confirmation-question cooldown — the spec
/// requires the invariant but leaves its storage unspecified).
fn create_preference_questions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS preference_questions (
            user_id     TEXT NOT NULL,
            pref_key    TEXT NOT NULL,
            asked_at    TEXT NOT NULL,
            PRIMARY KEY (user_id, pref_key)
        );",
    )?;
    Ok(())
}
