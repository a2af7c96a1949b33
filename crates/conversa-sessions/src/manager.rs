use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conversa_core::Platform;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::types::Session;

/// Sweep cadence for expired entries — teacher's scheduler tick-loop idiom
/// (`tokio::time::interval`), not tied to any individual session's TTL.
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Contract from spec §4.1. A future Redis-backed implementation can swap in
/// behind this trait without touching callers — mirrors the teacher's
/// `Channel`/`LlmProvider` swappable-collaborator shape.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, recipient: &str) -> Option<Session>;
    async fn get_or_create(&self, recipient: &str, platform: Platform) -> Session;
    async fn set_data(&self, recipient: &str, key: &str, value: Value) -> Result<()>;
    async fn set_many(&self, recipient: &str, kv: Vec<(String, Value)>) -> Result<()>;
    async fn get_data(&self, recipient: &str, key: &str) -> Option<Value>;
    async fn touch(&self, recipient: &str);
    async fn clear(&self, recipient: &str);
    /// Replace the full session record (used by the flow engine after it
    /// mutates a borrowed copy — sessions are not held locked across awaits).
    async fn put(&self, session: Session);
}

struct Entry {
    session: Session,
    last_touch: Instant,
}

/// In-memory, process-scoped session cache (§4.1). A node restart loses all
/// sessions — acceptable per §5: a session is pinned to the node holding its
/// cache lease, and there is no cross-node migration.
pub struct InMemorySessionStore {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl_secs: u64) -> Arc<Self> {
        let store = Arc::new(Self {
            entries: DashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
        });
        store.clone().spawn_sweeper();
        store
    }

    fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                self.sweep_expired();
            }
        });
    }

    #[instrument(skip(self))]
    fn sweep_expired(&self) {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.last_touch.elapsed() < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            info!(removed, remaining = self.entries.len(), "swept expired sessions");
        }
    }

    /// Whether a key has TTL'd out (used to detect abandoned flow runs, §8
    /// boundary behavior 11: "any suspended run is marked `abandoned` upon
    /// detection").
    pub fn is_expired(&self, recipient: &str) -> bool {
        match self.entries.get(recipient) {
            Some(entry) => entry.last_touch.elapsed() >= self.ttl,
            None => true,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, recipient: &str) -> Option<Session> {
        let entry = self.entries.get(recipient)?;
        if entry.last_touch.elapsed() >= self.ttl {
            drop(entry);
            self.entries.remove(recipient);
            return None;
        }
        Some(entry.session.clone())
    }

    #[instrument(skip(self), fields(recipient, %platform))]
    async fn get_or_create(&self, recipient: &str, platform: Platform) -> Session {
        if let Some(session) = self.get(recipient).await {
            return session;
        }
        debug!("creating new session");
        let session = Session::new(recipient, platform);
        self.entries.insert(
            recipient.to_string(),
            Entry {
                session: session.clone(),
                last_touch: Instant::now(),
            },
        );
        session
    }

    async fn set_data(&self, recipient: &str, key: &str, value: Value) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(recipient) {
            entry.session.data.insert(key.to_string(), value);
            entry.last_touch = Instant::now();
            entry.session.touch();
        }
        Ok(())
    }

    async fn set_many(&self, recipient: &str, kv: Vec<(String, Value)>) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(recipient) {
            for (k, v) in kv {
                entry.session.data.insert(k, v);
            }
            entry.last_touch = Instant::now();
            entry.session.touch();
        }
        Ok(())
    }

    async fn get_data(&self, recipient: &str, key: &str) -> Option<Value> {
        let entry = self.entries.get(recipient)?;
        if entry.last_touch.elapsed() >= self.ttl {
            return None;
        }
        entry.session.data.get(key).cloned()
    }

    async fn touch(&self, recipient: &str) {
        if let Some(mut entry) = self.entries.get_mut(recipient) {
            entry.last_touch = Instant::now();
            entry.session.touch();
        }
    }

    async fn clear(&self, recipient: &str) {
        self.entries.remove(recipient);
    }

    async fn put(&self, session: Session) {
        let key = session.recipient_id.clone();
        self.entries.insert(
            key,
            Entry {
                session,
                last_touch: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = InMemorySessionStore::new(1800);
        let a = store.get_or_create("web-1", Platform::Web).await;
        let b = store.get_or_create("web-1", Platform::Web).await;
        assert_eq!(a.data.get("created_at"), b.data.get("created_at"));
    }

    #[tokio::test]
    async fn missing_session_returns_none() {
        let store = InMemorySessionStore::new(1800);
        assert!(store.get("nobody").await.is_none());
    }

    #[tokio::test]
    async fn expired_session_is_treated_as_absent() {
        let store = InMemorySessionStore::new(0);
        store.get_or_create("web-1", Platform::Web).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.get("web-1").await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_session() {
        let store = InMemorySessionStore::new(1800);
        store.get_or_create("web-1", Platform::Web).await;
        store.clear("web-1").await;
        assert!(store.get("web-1").await.is_none());
    }

    #[tokio::test]
    async fn set_data_persists_and_touches() {
        let store = InMemorySessionStore::new(1800);
        store.get_or_create("web-1", Platform::Web).await;
        store
            .set_data("web-1", "user_id", Value::String("u-1".into()))
            .await
            .unwrap();
        let got = store.get_data("web-1", "user_id").await;
        assert_eq!(got, Some(Value::String("u-1".into())));
    }
}
