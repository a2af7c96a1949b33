use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier naming a conversation partner.
///
/// Channel-scoped by convention (`web-*`, raw phone digits, chat id) but the
/// core never unifies two recipient ids referring to the same human across
/// channels — that reconciliation is a downstream identity service's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipientId(pub String);

impl RecipientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecipientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecipientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The channel a session is bound to. Every session carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Whatsapp,
    Telegram,
    Web,
    Sms,
    Voice,
    Test,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Whatsapp => "WHATSAPP",
            Platform::Telegram => "TELEGRAM",
            Platform::Web => "WEB",
            Platform::Sms => "SMS",
            Platform::Voice => "VOICE",
            Platform::Test => "TEST",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WHATSAPP" => Ok(Platform::Whatsapp),
            "TELEGRAM" => Ok(Platform::Telegram),
            "WEB" => Ok(Platform::Web),
            "SMS" => Ok(Platform::Sms),
            "VOICE" => Ok(Platform::Voice),
            "TEST" => Ok(Platform::Test),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Time-sortable run identifier for a flow execution (UUIDv7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque user identifier, assigned only after authentication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Current timestamp as RFC3339 — the teacher's string-sortable convention
/// for `created_at`/`updated_at` columns across every persisted row.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_roundtrips_through_display_and_parse() {
        for p in [
            Platform::Whatsapp,
            Platform::Telegram,
            Platform::Web,
            Platform::Sms,
            Platform::Voice,
            Platform::Test,
        ] {
            let s = p.to_string();
            let parsed: Platform = s.parse().unwrap();
            assert_eq!(parsed, p);
        }
    }

    #[test]
    fn platform_parse_rejects_unknown() {
        assert!("carrier-pigeon".parse::<Platform>().is_err());
    }
}
