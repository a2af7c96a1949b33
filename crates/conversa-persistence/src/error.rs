use thiserror::Error;

/// Errors from the relational store (§6.6). Every variant maps onto the
/// `Persistence`/`SchemaError` kinds in the top-level error taxonomy (§7).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("flow schema error: {0}")]
    Schema(#[from] conversa_flow::FlowError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("flow not found: {id}")]
    FlowNotFound { id: String },

    #[error("flow run not found: {run_id}")]
    RunNotFound { run_id: String },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
