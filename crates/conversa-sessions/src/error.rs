use thiserror::Error;

/// Errors from the session store. Per spec §4.1, cache-unreachable is
/// tolerated (caller treats the session as empty) — these variants exist
/// for the rarer cases the store itself can detect synchronously.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session key is malformed: {0}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
