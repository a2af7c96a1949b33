use async_trait::async_trait;

use crate::{
    error::ChannelError,
    types::{CapabilitySet, ChannelStatus, OutboundMessage},
};

/// Common interface implemented by every channel provider (§4.3).
///
/// Implementations must be `Send + Sync` so they can be stored in a
/// [`ChannelManager`](crate::manager::ChannelManager) and driven from
/// multiple Tokio tasks.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier (e.g. `"whatsapp"`), unique across all
    /// registered adapters, and the key the dispatcher resolves by platform.
    fn name(&self) -> &str;

    /// What this provider can render natively — drives the dispatcher's
    /// capability-degradation fallback.
    fn capabilities(&self) -> CapabilitySet;

    async fn connect(&mut self) -> Result<(), ChannelError>;

    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Deliver a single outbound message to `recipient_id`. Intentionally
    /// `&self` so a connected adapter can send concurrently without a
    /// mutable borrow.
    async fn send(&self, recipient_id: &str, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Optional read-receipt support (§4.3: "`mark_read` (optional)").
    async fn mark_read(&self, _recipient_id: &str, _message_id: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    fn status(&self) -> ChannelStatus;

    /// Drain outbound messages queued for in-process delivery (web socket /
    /// test REST surfaces, §6.1). Webhook-delivered providers push directly
    /// in `send` and have nothing to drain, hence the empty default.
    async fn drain_outbound(&self, _recipient_id: &str) -> Vec<OutboundMessage> {
        Vec::new()
    }
}
