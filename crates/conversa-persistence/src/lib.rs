//! Relational persistence (§3.4-§3.6/§6.6): flow definitions, flow run
//! context, the append-only conversation log, training samples collected
//! for the classifier, and user preference profiles. One SQLite database
//! (`rusqlite`, bundled) shared across stores via a `Mutex<Connection>`
//! per store, with `DashMap` read-through caching where the access
//! pattern is read-mostly (§5).

pub mod conversation;
pub mod db;
pub mod error;
pub mod flows;
pub mod profiles;
pub mod runs;
pub mod training;
pub mod types;

pub use conversation::{ConversationLog, NewMessage};
pub use db::init_db;
pub use error::{PersistenceError, Result};
pub use flows::{FlowDefinitionStore, FlowSummary};
pub use profiles::{UserProfileStore, QUESTION_COOLDOWN_HOURS};
pub use runs::FlowRunStore;
pub use training::TrainingSampleStore;
pub use types::{
    ConversationMessageRow, FlowRow, FlowRunRow, TrainingSampleRow, UserProfileRow,
};
