use async_trait::async_trait;
use conversa_channels::InboundMessage;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::context::FlowContext;
use crate::executor::{ExecutionResult, Executor};
use crate::interpolate::{interpolate, resolve_path};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum ValidationType {
    #[default]
    Text,
    Pattern,
    Numeric,
    YesNo,
}

#[derive(Debug, Deserialize)]
struct ValidationConfig {
    #[serde(default)]
    source_path: Option<String>,
    #[serde(default, rename = "type")]
    validation_type: ValidationType,
    pattern: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    #[serde(default)]
    yes_patterns: Vec<String>,
    #[serde(default)]
    no_patterns: Vec<String>,
}

fn default_yes() -> &'static [&'static str] {
    &["yes", "y", "yeah", "yep", "sure", "ok", "okay"]
}

fn default_no() -> &'static [&'static str] {
    &["no", "n", "nope", "nah", "cancel"]
}

fn compiled(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

/// Validates input text against a pattern, numeric range, or yes/no
/// recognizer (§4.4). Emits `valid`/`invalid` for `text`/`pattern`/`numeric`,
/// or `yes`/`no`/`invalid` for `yes_no`.
pub struct ValidationExecutor;

#[async_trait]
impl Executor for ValidationExecutor {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        input: Option<&InboundMessage>,
    ) -> ExecutionResult {
        let cfg: ValidationConfig = match serde_json::from_value(config.clone()) {
            Ok(c) => c,
            Err(_) => return ExecutionResult::ok(Value::Null).with_event("invalid"),
        };

        let view = ctx.interpolation_view();
        let path = cfg.source_path.as_deref().unwrap_or("input.text");
        let text = if path == "input.text" {
            input.map(|m| m.effective_text().to_string()).unwrap_or_default()
        } else {
            resolve_path(&view, path).and_then(|v| v.as_str()).unwrap_or_default().to_string()
        };
        let text = text.trim().to_string();

        let event = match cfg.validation_type {
            ValidationType::Text => {
                if text.is_empty() {
                    "invalid"
                } else {
                    "valid"
                }
            }
            ValidationType::Pattern => match cfg.pattern.as_deref().map(interpolate_pattern).and_then(|p| compiled(&p)) {
                Some(re) if re.is_match(&text) => "valid",
                _ => "invalid",
            },
            ValidationType::Numeric => match text.parse::<f64>() {
                Ok(n) => {
                    let above_min = cfg.min.map(|m| n >= m).unwrap_or(true);
                    let below_max = cfg.max.map(|m| n <= m).unwrap_or(true);
                    if above_min && below_max {
                        "valid"
                    } else {
                        "invalid"
                    }
                }
                Err(_) => "invalid",
            },
            ValidationType::YesNo => {
                let lower = text.to_lowercase();
                let yes_patterns: Vec<&str> = if cfg.yes_patterns.is_empty() {
                    default_yes().to_vec()
                } else {
                    cfg.yes_patterns.iter().map(String::as_str).collect()
                };
                let no_patterns: Vec<&str> = if cfg.no_patterns.is_empty() {
                    default_no().to_vec()
                } else {
                    cfg.no_patterns.iter().map(String::as_str).collect()
                };
                if yes_patterns.iter().any(|p| lower == *p) {
                    "yes"
                } else if no_patterns.iter().any(|p| lower == *p) {
                    "no"
                } else {
                    "invalid"
                }
            }
        };

        ExecutionResult::ok(Value::String(text)).with_event(event)
    }
}

fn interpolate_pattern(pattern: &str) -> String {
    // Patterns are authored literally; no interpolation is applied so user
    // text can never alter the regex being matched against it.
    pattern.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg_with_text(text: &str) -> InboundMessage {
        InboundMessage {
            recipient_id: "r1".to_string(),
            platform: conversa_core::Platform::Test,
            text: Some(text.to_string()),
            attachments: vec![],
            buttons_reply: None,
            location: None,
            received_at: conversa_core::now_rfc3339(),
            provider_message_id: None,
        }
    }

    #[tokio::test]
    async fn numeric_range_check() {
        let executor = ValidationExecutor;
        let ctx = FlowContext::new("f1", 1, "sess", "start");
        let config = json!({"type": "numeric", "min": 1, "max": 5});
        let result = executor.execute(&config, &ctx, Some(&msg_with_text("3"))).await;
        assert_eq!(result.event.as_deref(), Some("valid"));
        let result = executor.execute(&config, &ctx, Some(&msg_with_text("9"))).await;
        assert_eq!(result.event.as_deref(), Some("invalid"));
    }

    #[tokio::test]
    async fn yes_no_recognition() {
        let executor = ValidationExecutor;
        let ctx = FlowContext::new("f1", 1, "sess", "start");
        let config = json!({"type": "yes_no"});
        assert_eq!(
            executor.execute(&config, &ctx, Some(&msg_with_text("yep"))).await.event.as_deref(),
            Some("yes")
        );
        assert_eq!(
            executor.execute(&config, &ctx, Some(&msg_with_text("nope"))).await.event.as_deref(),
            Some("no")
        );
        assert_eq!(
            executor.execute(&config, &ctx, Some(&msg_with_text("maybe"))).await.event.as_deref(),
            Some("invalid")
        );
    }

    #[tokio::test]
    async fn pattern_check() {
        let executor = ValidationExecutor;
        let ctx = FlowContext::new("f1", 1, "sess", "start");
        let config = json!({"type": "pattern", "pattern": "^[0-9]{6}$"});
        assert_eq!(
            executor.execute(&config, &ctx, Some(&msg_with_text("123456"))).await.event.as_deref(),
            Some("valid")
        );
        assert_eq!(
            executor.execute(&config, &ctx, Some(&msg_with_text("abc"))).await.event.as_deref(),
            Some("invalid")
        );
    }
}
