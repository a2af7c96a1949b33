//! Channel-agnostic dispatch (§4.2/§4.3): normalize heterogeneous inbound
//! webhook payloads to a canonical [`InboundMessage`], and route canonical
//! [`OutboundMessage`]s back through the provider matching the recipient's
//! platform, with capability degradation on limited channels.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod normalizer;
pub mod providers;
pub mod types;

pub use channel::Channel;
pub use dispatcher::OutboundDispatcher;
pub use error::ChannelError;
pub use manager::ChannelManager;
pub use providers::{InMemoryChannel, WebhookChannel};
pub use types::{
    Attachment, AttachmentKind, Button, ButtonsReply, CapabilitySet, ChannelStatus, GeoLocation,
    InboundMessage, ListItem, OutboundMessage,
};
