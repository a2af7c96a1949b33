use async_trait::async_trait;
use conversa_core::{now_rfc3339, Platform};
use serde::Deserialize;

use crate::error::{ChannelError, Result};
use crate::types::{Attachment, AttachmentKind, ButtonsReply, GeoLocation, InboundMessage};

/// Speech-to-text collaborator for the voice/audio path (§4.2). Mirrors the
/// NLU/LLM client shape — a thin trait so a real provider can be swapped in
/// without touching the normalizer.
#[async_trait]
pub trait AsrClient: Send + Sync {
    async fn transcribe(&self, audio_url_or_id: &str) -> Result<String>;
}

/// Raw payload shape for Messaging app A (§6.1): `from`, `text.body` or
/// `audio.id`, `message.id`, optional button reply / location.
#[derive(Debug, Deserialize)]
pub struct MessagingAppAPayload {
    pub from: String,
    pub text: Option<MessagingAppAText>,
    pub audio: Option<MessagingAppAAudio>,
    pub message: MessagingAppAMessageMeta,
    pub button_reply: Option<MessagingAppAButtonReply>,
    pub location: Option<GeoLocation>,
}

#[derive(Debug, Deserialize)]
pub struct MessagingAppAText {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagingAppAAudio {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagingAppAMessageMeta {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagingAppAButtonReply {
    pub id: String,
    pub title: Option<String>,
}

/// Normalize a Messaging App A (WhatsApp-class) webhook payload.
pub async fn normalize_messaging_app_a(
    payload: MessagingAppAPayload,
    asr: Option<&dyn AsrClient>,
) -> Result<InboundMessage> {
    let mut text = payload.text.map(|t| t.body);
    let mut attachments = Vec::new();

    if let Some(audio) = payload.audio {
        attachments.push(Attachment {
            kind: AttachmentKind::Audio,
            url_or_id: audio.id.clone(),
        });
        if text.is_none() {
            text = Some(resolve_audio_text(&audio.id, asr).await?);
        }
    }

    Ok(InboundMessage {
        recipient_id: payload.from.clone(),
        platform: Platform::Whatsapp,
        text,
        attachments,
        buttons_reply: payload.button_reply.map(|b| ButtonsReply { id: b.id, label: b.title }),
        location: payload.location,
        received_at: now_rfc3339(),
        provider_message_id: Some(payload.message.id),
    })
}

/// Raw payload shape for Messaging App B (Telegram-class): `chat.id`,
/// `text` or `voice.file_id`, optional inline keyboard reply.
#[derive(Debug, Deserialize)]
pub struct MessagingAppBPayload {
    pub chat: MessagingAppBChat,
    pub text: Option<String>,
    pub voice: Option<MessagingAppBVoice>,
    pub message_id: Option<i64>,
    pub callback_data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagingAppBChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct MessagingAppBVoice {
    pub file_id: String,
}

pub async fn normalize_messaging_app_b(
    payload: MessagingAppBPayload,
    asr: Option<&dyn AsrClient>,
) -> Result<InboundMessage> {
    let mut text = payload.text;
    let mut attachments = Vec::new();

    if let Some(voice) = payload.voice {
        attachments.push(Attachment {
            kind: AttachmentKind::Audio,
            url_or_id: voice.file_id.clone(),
        });
        if text.is_none() {
            text = Some(resolve_audio_text(&voice.file_id, asr).await?);
        }
    }

    Ok(InboundMessage {
        recipient_id: payload.chat.id.to_string(),
        platform: Platform::Telegram,
        text,
        attachments,
        buttons_reply: payload.callback_data.map(|id| ButtonsReply { id, label: None }),
        location: None,
        received_at: now_rfc3339(),
        provider_message_id: payload.message_id.map(|id| id.to_string()),
    })
}

/// Web socket payload: `sessionId`, `message`.
#[derive(Debug, Deserialize)]
pub struct WebSocketPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message: String,
}

pub fn normalize_websocket(payload: WebSocketPayload) -> InboundMessage {
    InboundMessage {
        recipient_id: payload.session_id,
        platform: Platform::Web,
        text: Some(payload.message),
        attachments: Vec::new(),
        buttons_reply: None,
        location: None,
        received_at: now_rfc3339(),
        provider_message_id: None,
    }
}

/// Test REST payload: `recipientId`, `text`.
#[derive(Debug, Deserialize)]
pub struct TestRestPayload {
    #[serde(rename = "recipientId")]
    pub recipient_id: String,
    pub text: String,
}

pub fn normalize_test_rest(payload: TestRestPayload) -> InboundMessage {
    InboundMessage {
        recipient_id: payload.recipient_id,
        platform: Platform::Test,
        text: Some(payload.text),
        attachments: Vec::new(),
        buttons_reply: None,
        location: None,
        received_at: now_rfc3339(),
        provider_message_id: None,
    }
}

/// SMS payload: `from`, `body`.
#[derive(Debug, Deserialize)]
pub struct SmsPayload {
    pub from: String,
    pub body: String,
}

pub fn normalize_sms(payload: SmsPayload) -> InboundMessage {
    InboundMessage {
        recipient_id: payload.from,
        platform: Platform::Sms,
        text: Some(payload.body),
        attachments: Vec::new(),
        buttons_reply: None,
        location: None,
        received_at: now_rfc3339(),
        provider_message_id: None,
    }
}

async fn resolve_audio_text(audio_id: &str, asr: Option<&dyn AsrClient>) -> Result<String> {
    match asr {
        Some(asr) => asr.transcribe(audio_id).await,
        None => Err(ChannelError::AsrFailed(
            "no ASR collaborator configured".to_string(),
        )),
    }
}
