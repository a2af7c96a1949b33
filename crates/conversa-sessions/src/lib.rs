//! Ephemeral, per-recipient session store (§3.1/§4.1): sliding TTL,
//! touch-on-read, process-scoped — not durable by design.

pub mod error;
pub mod manager;
pub mod types;

pub use error::SessionError;
pub use manager::{InMemorySessionStore, SessionStore};
pub use types::{HistoryTurn, Location, PendingIntent, Session};
