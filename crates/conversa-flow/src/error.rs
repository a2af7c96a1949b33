use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow schema error: {0}")]
    Schema(String),

    #[error("unhandled event {event} in state {state}")]
    UnhandledEvent { state: String, event: String },

    #[error("unknown executor: {0}")]
    UnknownExecutor(String),

    #[error("deadline exceeded after {ms}ms")]
    DeadlineExceeded { ms: u64 },

    #[error("run is not in a resumable state: {0}")]
    NotResumable(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
