use thiserror::Error;

#[derive(Debug, Error)]
pub enum NluError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("NLU service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("request timed out")]
    Timeout,
}
