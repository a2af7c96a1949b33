use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Sliding session TTL (§3.1): 30 minutes since last inbound, touch-on-read.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

/// Per-recipient bounded inbound queue depth (§5 back-pressure).
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// Inbound handling wall-clock deadline (§5).
pub const DEFAULT_STEP_DEADLINE_MS: u64 = 8_000;

/// Confidence thresholds for the intent router (§4.6) and preference tiers (§4.8).
pub const HIGH_CONFIDENCE: f64 = 0.80;
pub const PREFERENCE_AUTO_SAVE_CONFIDENCE: f64 = 0.85;
pub const PREFERENCE_CONFIRM_CONFIDENCE: f64 = 0.70;
pub const PREFERENCE_COOLDOWN_HOURS: i64 = 24;

/// Top-level config: `conversa.toml` + `CONVERSA_*` env overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub nlu: NluConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            session: SessionConfig::default(),
            nlu: NluConfig::default(),
            llm: LlmConfig::default(),
            channels: ChannelsConfig::default(),
            locale: LocaleConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token the admin CLI must present for `/admin/*` routes
    /// (§6.7). `None` leaves admin routes open — acceptable only when the
    /// gateway binds to loopback.
    pub admin_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_step_deadline_ms")]
    pub step_deadline_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            queue_depth: default_queue_depth(),
            step_deadline_ms: default_step_deadline_ms(),
        }
    }
}

/// NLU service (§6.3): `POST /classify`, 500ms timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluConfig {
    pub base_url: Option<String>,
    #[serde(default = "default_nlu_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_nlu_timeout_ms(),
            high_confidence: default_high_confidence(),
        }
    }
}

/// LLM service (§6.4): OpenAI-style `/v1/chat/completions`, 10s timeout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub anthropic: Option<AnthropicProviderConfig>,
    pub openai: Option<OpenAiProviderConfig>,
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_llm_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicProviderConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    pub whatsapp: Option<WebhookChannelConfig>,
    pub telegram: Option<WebhookChannelConfig>,
    pub sms: Option<WebhookChannelConfig>,
}

/// Credentials for a webhook-delivered channel (§6.1). `signing_secret` is
/// used for HMAC verification of inbound webhooks where the provider
/// supports it (the core never assumes a specific provider's scheme).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    /// Outbound delivery endpoint for this channel's provider. Channels
    /// without one still accept inbound webhooks but cannot send replies.
    pub send_url: Option<String>,
    pub provider_token: Option<String>,
    pub signing_secret: Option<String>,
}

/// Static routing table (§4.6 steps 4-5): which flow handles authentication,
/// and which flow each module falls back to when no trigger matches but
/// something in that module still needs handling.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingConfig {
    pub auth_flow: Option<String>,
    #[serde(default)]
    pub fallback_flows: std::collections::HashMap<String, String>,
}

/// Locale-specific soft-fail copy (§7: "Soft-failure copy is configurable
/// per locale").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default = "default_soft_fail_text")]
    pub soft_fail_text: String,
    #[serde(default = "default_rate_limited_text")]
    pub rate_limited_text: String,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            soft_fail_text: default_soft_fail_text(),
            rate_limited_text: default_rate_limited_text(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.conversa/conversa.db", home)
}
fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}
fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}
fn default_step_deadline_ms() -> u64 {
    DEFAULT_STEP_DEADLINE_MS
}
fn default_nlu_timeout_ms() -> u64 {
    500
}
fn default_high_confidence() -> f64 {
    HIGH_CONFIDENCE
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_anthropic_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_locale() -> String {
    "en".to_string()
}
fn default_soft_fail_text() -> String {
    "Sorry, something went wrong on our end. Please try again in a moment.".to_string()
}
fn default_rate_limited_text() -> String {
    "You're going a bit fast for me — try again in a moment.".to_string()
}

impl OrchestratorConfig {
    /// Load config from a TOML file with `CONVERSA_*` env var overrides.
    ///
    /// Checks, in order: explicit path argument, then `~/.conversa/conversa.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: OrchestratorConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CONVERSA_").split("_"))
            .extract()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.conversa/conversa.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_thresholds() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.session.ttl_secs, 1800);
        assert_eq!(cfg.nlu.high_confidence, 0.80);
        assert_eq!(cfg.session.queue_depth, 4);
    }
}
