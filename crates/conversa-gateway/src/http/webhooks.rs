//! Webhook ingress — POST /webhooks/:source. Mirrors the shape of a
//! generic webhook endpoint: verify per-source auth, normalize the
//! provider-specific payload to the canonical inbound shape, hand it to the
//! conversation pipeline.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use conversa_channels::normalizer::{
    normalize_messaging_app_a, normalize_messaging_app_b, normalize_sms, MessagingAppAPayload,
    MessagingAppBPayload, SmsPayload,
};
use conversa_core::config::WebhookChannelConfig;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

/// POST /webhooks/:source
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let source_cfg = source_config(&state, &source).ok_or_else(|| {
        warn!(source = %source, "unknown webhook source");
        (StatusCode::NOT_FOUND, Json(json!({"error": "unknown webhook source"})))
    })?;

    if let Some(secret) = &source_cfg.signing_secret {
        verify_hmac_sha256(&headers, &body, secret).map_err(|e| auth_error(&e))?;
    } else if let Some(token) = &source_cfg.provider_token {
        verify_bearer_token(&headers, token).map_err(|e| auth_error(&e))?;
    }

    info!(source = %source, bytes = body.len(), "webhook arrived");

    let inbound = match source.as_str() {
        "whatsapp" => {
            let payload: MessagingAppAPayload = parse_body(&body)?;
            normalize_messaging_app_a(payload, None).await
        }
        "telegram" => {
            let payload: MessagingAppBPayload = parse_body(&body)?;
            normalize_messaging_app_b(payload, None).await
        }
        "sms" => {
            let payload: SmsPayload = parse_body(&body)?;
            Ok(normalize_sms(payload))
        }
        other => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("no normalizer for source '{other}'")})),
            ))
        }
    }
    .map_err(|e| {
        warn!(source = %source, error = %e, "failed to normalize webhook payload");
        (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()})))
    })?;

    state.service.handle_inbound(inbound).await.map_err(|e| {
        warn!(source = %source, error = %e, "conversation pipeline rejected inbound message");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})))
    })?;

    Ok(Json(json!({"ok": true})))
}

fn source_config<'a>(state: &'a AppState, source: &str) -> Option<&'a WebhookChannelConfig> {
    match source {
        "whatsapp" => state.config.channels.whatsapp.as_ref(),
        "telegram" => state.config.channels.telegram.as_ref(),
        "sms" => state.config.channels.sms.as_ref(),
        _ => None,
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(
    body: &Bytes,
) -> Result<T, (StatusCode, Json<Value>)> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "invalid JSON in webhook body");
        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid JSON body"})))
    })
}

fn verify_hmac_sha256(headers: &HeaderMap, body: &Bytes, secret: &str) -> Result<(), String> {
    let sig_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Hub-Signature-256 header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Hub-Signature-256 header".to_string())?;

    let expected = hex::decode(sig_hex).map_err(|_| "X-Hub-Signature-256 is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected).map_err(|_| "HMAC signature mismatch".to_string())
}

fn verify_bearer_token(headers: &HeaderMap, expected: &str) -> Result<(), String> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if token == expected {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}

fn auth_error(reason: &str) -> (StatusCode, Json<Value>) {
    warn!(reason = %reason, "webhook authentication failed");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "authentication failed", "reason": reason})),
    )
}
