//! Shared ids, the error taxonomy (§7) and configuration (figment-backed)
//! used by every crate in the conversational orchestration core.

pub mod config;
pub mod error;
pub mod types;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use types::{now_rfc3339, Platform, RecipientId, RunId, UserId};
