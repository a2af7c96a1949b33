use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::{ChannelError, Result};
use crate::types::{CapabilitySet, ChannelStatus, OutboundMessage};

/// Request/response channel used for Web socket and Test REST traffic (§6.1):
/// outbound messages are enqueued per recipient and drained by the HTTP/WS
/// handler that owns the originating connection, rather than pushed to a
/// remote provider.
pub struct InMemoryChannel {
    name: String,
    capabilities: CapabilitySet,
    queues: DashMap<String, Vec<OutboundMessage>>,
    status: Mutex<ChannelStatus>,
}

impl InMemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: CapabilitySet::RICH,
            queues: DashMap::new(),
            status: Mutex::new(ChannelStatus::Disconnected),
        }
    }

    /// Drain and return all outbound messages queued for `recipient_id`, in
    /// the order they were sent.
    pub fn drain(&self, recipient_id: &str) -> Vec<OutboundMessage> {
        self.queues
            .remove(recipient_id)
            .map(|(_, v)| v)
            .unwrap_or_default()
    }
}

#[async_trait]
impl Channel for InMemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn connect(&mut self) -> Result<()> {
        *self.status.lock().unwrap() = ChannelStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        *self.status.lock().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, recipient_id: &str, msg: &OutboundMessage) -> Result<()> {
        debug!(channel = %self.name, recipient = recipient_id, "queued outbound for in-process delivery");
        self.queues
            .entry(recipient_id.to_string())
            .or_default()
            .push(msg.clone());
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.lock().unwrap().clone()
    }

    async fn drain_outbound(&self, recipient_id: &str) -> Vec<OutboundMessage> {
        self.drain(recipient_id)
    }
}

/// Generic webhook-delivered provider (WhatsApp/Telegram/SMS-class): posts
/// the canonical outbound shape to a per-deployment webhook URL over a
/// bearer token. The spec excludes "channel provider SDKs/webhook parsing
/// specifics" — this adapter deliberately stays a thin, provider-agnostic
/// HTTP shim rather than a vendored SDK integration.
pub struct WebhookChannel {
    name: String,
    capabilities: CapabilitySet,
    client: reqwest::Client,
    send_url: String,
    token: Option<String>,
    status: Mutex<ChannelStatus>,
}

impl WebhookChannel {
    pub fn new(
        name: impl Into<String>,
        capabilities: CapabilitySet,
        send_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities,
            client: reqwest::Client::new(),
            send_url: send_url.into(),
            token,
            status: Mutex::new(ChannelStatus::Disconnected),
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn connect(&mut self) -> Result<()> {
        *self.status.lock().unwrap() = ChannelStatus::Connected;
        info!(channel = %self.name, "webhook channel ready");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        *self.status.lock().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, recipient_id: &str, msg: &OutboundMessage) -> Result<()> {
        let mut req = self.client.post(&self.send_url).json(&serde_json::json!({
            "recipient_id": recipient_id,
            "message": msg,
        }));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChannelError::SendFailed(format!(
                "provider returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.lock().unwrap().clone()
    }
}
