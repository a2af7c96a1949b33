use conversa_core::Platform;
use serde::{Deserialize, Serialize};

/// An attachment carried by an inbound message (image, audio/voice note, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url_or_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Audio,
    Document,
}

/// The reply a user sent by tapping a button or list item previously offered
/// by an outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonsReply {
    pub id: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
}

/// Canonical inbound shape every channel normalizer converges on (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub recipient_id: String,
    pub platform: Platform,
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub buttons_reply: Option<ButtonsReply>,
    pub location: Option<GeoLocation>,
    pub received_at: String,
    pub provider_message_id: Option<String>,
}

impl InboundMessage {
    /// Text the intent router/flow engine should treat as the user's input —
    /// `""` only when neither text nor a resolved transcript is present,
    /// which normalizers should avoid (§4.2 ASR fallback / reject path).
    pub fn effective_text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// A single selectable button (`{id, label}` per §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub label: String,
}

/// A single selectable list item (richer than a button: title + optional
/// description, per the platforms that support native lists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

/// Canonical outbound shape handed to the dispatcher (§4.3). One variant per
/// `send_*` function in the spec's outbound contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text { text: String },
    Image { url: String, caption: Option<String> },
    Buttons { text: String, buttons: Vec<Button> },
    List { text: String, items: Vec<ListItem> },
    LocationRequest { text: String },
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}

/// What a channel provider can render natively. The dispatcher degrades
/// `Buttons`/`List` to numbered text on providers lacking the capability
/// (§4.3 "Capability degradation").
#[derive(Debug, Clone, Copy)]
pub struct CapabilitySet {
    pub supports_buttons: bool,
    pub supports_lists: bool,
    pub supports_images: bool,
    pub supports_location_request: bool,
    /// Most buttons the provider can render in one native message, even
    /// when `supports_buttons` is true (WhatsApp-class providers cap
    /// interactive reply buttons at 3). `None` means no provider-side cap.
    pub max_buttons: Option<usize>,
}

impl CapabilitySet {
    /// Rich messaging apps (WhatsApp/Telegram-class): everything native,
    /// capped at 3 buttons per message.
    pub const RICH: CapabilitySet = CapabilitySet {
        supports_buttons: true,
        supports_lists: true,
        supports_images: true,
        supports_location_request: true,
        max_buttons: Some(3),
    };

    /// SMS-class: text only.
    pub const TEXT_ONLY: CapabilitySet = CapabilitySet {
        supports_buttons: false,
        supports_lists: false,
        supports_images: false,
        supports_location_request: false,
        max_buttons: None,
    };
}
