use thiserror::Error;

/// Errors that can occur within any channel adapter or the dispatcher that
/// fronts them.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// No provider is registered for the platform the message is addressed
    /// to (§4.3: "a platform with no registered provider returns
    /// `UnsupportedChannel`").
    #[error("unsupported channel: no provider registered for {0}")]
    UnsupportedChannel(String),

    /// ASR failed to transcribe a voice attachment and no text was present
    /// (§4.2 "Channel-specific rules (audio/voice)").
    #[error("speech recognition failed: {0}")]
    AsrFailed(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
