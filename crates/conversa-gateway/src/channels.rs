//! Registers every configured channel adapter into one [`ChannelManager`]
//! (§4.3/§6.1). `web` and `test` are always present — the gateway's own
//! WebSocket and test-REST surfaces have no transport-level credentials to
//! configure. Webhook-delivered channels are registered only when their
//! section in `conversa.toml` carries a `send_url`; without one the channel
//! still accepts inbound webhooks but cannot dispatch replies.

use conversa_channels::{CapabilitySet, ChannelManager, InMemoryChannel, WebhookChannel};
use conversa_core::config::{ChannelsConfig, WebhookChannelConfig};

pub fn build_channel_manager(cfg: &ChannelsConfig) -> ChannelManager {
    let mut manager = ChannelManager::new();

    manager.register(Box::new(InMemoryChannel::new("web")));
    manager.register(Box::new(InMemoryChannel::new("test")));

    register_webhook_channel(&mut manager, "whatsapp", CapabilitySet::RICH, &cfg.whatsapp);
    register_webhook_channel(&mut manager, "telegram", CapabilitySet::RICH, &cfg.telegram);
    register_webhook_channel(&mut manager, "sms", CapabilitySet::TEXT_ONLY, &cfg.sms);

    manager
}

fn register_webhook_channel(
    manager: &mut ChannelManager,
    name: &'static str,
    capabilities: CapabilitySet,
    cfg: &Option<WebhookChannelConfig>,
) {
    let Some(cfg) = cfg else { return };
    let Some(send_url) = &cfg.send_url else {
        tracing::warn!(channel = name, "no send_url configured, outbound replies will fail");
        return;
    };
    manager.register(Box::new(WebhookChannel::new(
        name,
        capabilities,
        send_url.clone(),
        cfg.provider_token.clone(),
    )));
}
