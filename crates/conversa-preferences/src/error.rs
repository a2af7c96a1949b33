use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("llm provider error: {0}")]
    Llm(#[from] conversa_llm::ProviderError),

    #[error("persistence error: {0}")]
    Persistence(#[from] conversa_persistence::PersistenceError),

    #[error("extraction response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PreferenceError>;
