use thiserror::Error;

/// Error taxonomy from spec §7 — kinds, not exception types. Every crate's
/// local error enum maps onto one of these variants via `From`/`code()`, and
/// none of them ever cross the Flow Engine boundary: executors convert their
/// failures to transition events before the engine sees them (§7
/// "Propagation").
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// NLU/LLM/HTTP/cache 5xx or timeout. Retried once with jitter before the
    /// executor gives up and emits `error`.
    #[error("transient upstream failure ({source}): {message}")]
    TransientUpstream { source: String, message: String },

    /// 4xx from a business collaborator. Never retried.
    #[error("permanent upstream failure ({source}): {message}")]
    PermanentUpstream { source: String, message: String },

    /// Validation executor rejected the input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No transition defined for an emitted event.
    #[error("unhandled event {event} in state {state}")]
    UnhandledEvent { state: String, event: String },

    /// Flow JSON failed structural validation on load.
    #[error("flow schema error: {0}")]
    SchemaError(String),

    /// Step wall-clock deadline exceeded.
    #[error("deadline exceeded after {ms}ms")]
    DeadlineExceeded { ms: u64 },

    /// A protected action was reached without `session.authenticated`. This
    /// should never surface — the router's pending-intent detour is supposed
    /// to catch it upstream — but executors check it defensively.
    #[error("unauthenticated access to protected action {action}")]
    Unauthenticated { action: String },

    /// Per-recipient queue overflow.
    #[error("rate limited: recipient queue is full")]
    RateLimited,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Short wire code, e.g. for admin CLI diagnostics or logs — never shown
    /// to end users (spec §7: "the user never sees... kind codes").
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::TransientUpstream { .. } => "TRANSIENT_UPSTREAM",
            OrchestratorError::PermanentUpstream { .. } => "PERMANENT_UPSTREAM",
            OrchestratorError::InvalidInput(_) => "INVALID_INPUT",
            OrchestratorError::UnhandledEvent { .. } => "UNHANDLED_EVENT",
            OrchestratorError::SchemaError(_) => "SCHEMA_ERROR",
            OrchestratorError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            OrchestratorError::Unauthenticated { .. } => "UNAUTHENTICATED",
            OrchestratorError::RateLimited => "RATE_LIMITED",
            OrchestratorError::Config(_) => "CONFIG_ERROR",
            OrchestratorError::Persistence(_) => "PERSISTENCE_ERROR",
            OrchestratorError::Serialization(_) => "SERIALIZATION_ERROR",
            OrchestratorError::Io(_) => "IO_ERROR",
            OrchestratorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this kind is, in principle, worth retrying once with jitter
    /// per the `TransientUpstream` policy in spec §7.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestratorError::TransientUpstream { .. })
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
