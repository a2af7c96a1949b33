use conversa_core::Platform;
use tracing::{info, warn};

use crate::error::{ChannelError, Result};
use crate::manager::ChannelManager;
use crate::types::{Button, ListItem, OutboundMessage};

/// Implements the `send_*` contract from §4.3 over the registered [`Channel`]
/// providers, resolving the target provider by platform and downgrading
/// rich content (buttons/lists) to numbered text on channels that lack the
/// capability.
///
/// Messages queued from a single flow run are expected to be sent serially,
/// in order, by the caller simply `.await`-ing each `send` before issuing
/// the next — the dispatcher does no internal reordering or batching.
pub struct OutboundDispatcher<'a> {
    manager: &'a ChannelManager,
}

impl<'a> OutboundDispatcher<'a> {
    pub fn new(manager: &'a ChannelManager) -> Self {
        Self { manager }
    }

    fn provider_name(platform: Platform) -> &'static str {
        match platform {
            Platform::Whatsapp => "whatsapp",
            Platform::Telegram => "telegram",
            Platform::Web => "web",
            Platform::Sms => "sms",
            Platform::Voice => "voice",
            Platform::Test => "test",
        }
    }

    /// Route `msg` to `recipient_id` over `platform`'s registered provider,
    /// degrading capability as needed. Returns `UnsupportedChannel` if no
    /// provider is registered for the platform.
    pub async fn dispatch(
        &self,
        platform: Platform,
        recipient_id: &str,
        msg: OutboundMessage,
    ) -> Result<()> {
        let name = Self::provider_name(platform);
        let channel = self
            .manager
            .get(name)
            .ok_or_else(|| ChannelError::UnsupportedChannel(name.to_string()))?;

        let caps = channel.capabilities();
        let degraded = degrade(msg, caps);
        if degraded.1 {
            warn!(
                channel = name,
                recipient = recipient_id,
                "degraded_capability: falling back to numbered text options"
            );
        }
        info!(channel = name, recipient = recipient_id, "dispatching outbound message");
        channel.send(recipient_id, &degraded.0).await
    }

    pub async fn send_text(&self, platform: Platform, recipient_id: &str, text: &str) -> Result<()> {
        self.dispatch(
            platform,
            recipient_id,
            OutboundMessage::Text { text: text.to_string() },
        )
        .await
    }

    pub async fn send_image(
        &self,
        platform: Platform,
        recipient_id: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.dispatch(
            platform,
            recipient_id,
            OutboundMessage::Image {
                url: url.to_string(),
                caption: caption.map(str::to_string),
            },
        )
        .await
    }

    pub async fn send_buttons(
        &self,
        platform: Platform,
        recipient_id: &str,
        text: &str,
        buttons: Vec<Button>,
    ) -> Result<()> {
        self.dispatch(
            platform,
            recipient_id,
            OutboundMessage::Buttons { text: text.to_string(), buttons },
        )
        .await
    }

    pub async fn send_list(
        &self,
        platform: Platform,
        recipient_id: &str,
        text: &str,
        items: Vec<ListItem>,
    ) -> Result<()> {
        self.dispatch(
            platform,
            recipient_id,
            OutboundMessage::List { text: text.to_string(), items },
        )
        .await
    }

    pub async fn send_location_request(
        &self,
        platform: Platform,
        recipient_id: &str,
        text: &str,
    ) -> Result<()> {
        self.dispatch(
            platform,
            recipient_id,
            OutboundMessage::LocationRequest { text: text.to_string() },
        )
        .await
    }

    pub async fn mark_read(&self, platform: Platform, recipient_id: &str, message_id: &str) -> Result<()> {
        let name = Self::provider_name(platform);
        let channel = self
            .manager
            .get(name)
            .ok_or_else(|| ChannelError::UnsupportedChannel(name.to_string()))?;
        channel.mark_read(recipient_id, message_id).await
    }
}

/// Downgrade `msg` to plain text if `caps` can't render it natively.
/// Returns the (possibly rewritten) message plus whether degradation fired.
fn degrade(msg: OutboundMessage, caps: crate::types::CapabilitySet) -> (OutboundMessage, bool) {
    match msg {
        OutboundMessage::Buttons { text, buttons } if !caps.supports_buttons => {
            let mut rendered = text;
            rendered.push('\n');
            for (i, b) in buttons.iter().enumerate() {
                rendered.push_str(&format!("\n{}. {}", i + 1, b.label));
            }
            (OutboundMessage::Text { text: rendered }, true)
        }
        OutboundMessage::Buttons { text, buttons } if caps.max_buttons.is_some_and(|max| buttons.len() > max) => {
            let max = caps.max_buttons.expect("checked by guard");
            let mut rendered = text;
            rendered.push('\n');
            for (i, b) in buttons.iter().enumerate().skip(max) {
                rendered.push_str(&format!("\n{}. {}", i + 1, b.label));
            }
            let kept = buttons.into_iter().take(max).collect();
            (OutboundMessage::Buttons { text: rendered, buttons: kept }, true)
        }
        OutboundMessage::List { text, items } if !caps.supports_lists => {
            let mut rendered = text;
            rendered.push('\n');
            for (i, item) in items.iter().enumerate() {
                rendered.push_str(&format!("\n{}. {}", i + 1, item.title));
                if let Some(desc) = &item.description {
                    rendered.push_str(&format!(" — {desc}"));
                }
            }
            (OutboundMessage::Text { text: rendered }, true)
        }
        OutboundMessage::Image { url, caption } if !caps.supports_images => {
            let text = match caption {
                Some(c) => format!("{c}\n{url}"),
                None => url,
            };
            (OutboundMessage::Text { text }, true)
        }
        OutboundMessage::LocationRequest { text } if !caps.supports_location_request => {
            (OutboundMessage::Text { text }, true)
        }
        other => (other, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CapabilitySet;

    #[test]
    fn buttons_degrade_to_numbered_text_on_text_only_channel() {
        let msg = OutboundMessage::Buttons {
            text: "Pick one".to_string(),
            buttons: vec![
                Button { id: "a".into(), label: "Option A".into() },
                Button { id: "b".into(), label: "Option B".into() },
            ],
        };
        let (out, degraded) = degrade(msg, CapabilitySet::TEXT_ONLY);
        assert!(degraded);
        match out {
            OutboundMessage::Text { text } => {
                assert!(text.contains("1. Option A"));
                assert!(text.contains("2. Option B"));
            }
            _ => panic!("expected text fallback"),
        }
    }

    #[test]
    fn buttons_pass_through_on_rich_channel() {
        let msg = OutboundMessage::Buttons {
            text: "Pick one".to_string(),
            buttons: vec![Button { id: "a".into(), label: "Option A".into() }],
        };
        let (out, degraded) = degrade(msg, CapabilitySet::RICH);
        assert!(!degraded);
        assert!(matches!(out, OutboundMessage::Buttons { .. }));
    }

    #[test]
    fn buttons_over_the_provider_cap_truncate_and_append_overflow_as_text() {
        let msg = OutboundMessage::Buttons {
            text: "Pick one".to_string(),
            buttons: vec![
                Button { id: "a".into(), label: "Option A".into() },
                Button { id: "b".into(), label: "Option B".into() },
                Button { id: "c".into(), label: "Option C".into() },
                Button { id: "d".into(), label: "Option D".into() },
            ],
        };
        let (out, degraded) = degrade(msg, CapabilitySet::RICH);
        assert!(degraded);
        match out {
            OutboundMessage::Buttons { text, buttons } => {
                assert_eq!(buttons.len(), 3);
                assert!(text.contains("4. Option D"));
            }
            _ => panic!("expected truncated buttons, not a full text fallback"),
        }
    }

    #[test]
    fn buttons_within_the_provider_cap_pass_through_unchanged() {
        let msg = OutboundMessage::Buttons {
            text: "Pick one".to_string(),
            buttons: vec![
                Button { id: "a".into(), label: "Option A".into() },
                Button { id: "b".into(), label: "Option B".into() },
            ],
        };
        let (out, degraded) = degrade(msg, CapabilitySet::RICH);
        assert!(!degraded);
        match out {
            OutboundMessage::Buttons { buttons, .. } => assert_eq!(buttons.len(), 2),
            _ => panic!("expected buttons to pass through"),
        }
    }
}
