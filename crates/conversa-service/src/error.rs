use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("routing error: {0}")]
    Router(#[from] conversa_router::RouterError),

    #[error("flow engine error: {0}")]
    Flow(#[from] conversa_flow::FlowError),

    #[error("persistence error: {0}")]
    Persistence(#[from] conversa_persistence::PersistenceError),

    #[error("channel dispatch error: {0}")]
    Channel(#[from] conversa_channels::ChannelError),

    #[error("preference enrichment error: {0}")]
    Preference(#[from] conversa_preferences::PreferenceError),

    #[error("flow '{0}' is not defined")]
    UnknownFlow(String),

    #[error("flow run '{0}' is in-flight but has no persisted context")]
    MissingRunContext(String),

    #[error("rate limited: recipient queue is full")]
    RateLimited,

    #[error("inbound handling exceeded its {ms}ms deadline")]
    DeadlineExceeded { ms: u64 },
}

pub type Result<T> = std::result::Result<T, ServiceError>;
