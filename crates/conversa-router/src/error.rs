use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("flow store error: {0}")]
    Persistence(#[from] conversa_persistence::PersistenceError),

    #[error("no auth flow configured but intent '{intent}' requires authentication")]
    NoAuthFlowConfigured { intent: String },
}

pub type Result<T> = std::result::Result<T, RouterError>;
