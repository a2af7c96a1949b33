//! Test REST surface (§6.1): a synchronous request/response channel for
//! integration tests and manual probing — no webhook signing, no socket.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use conversa_channels::normalizer::{normalize_test_rest, TestRestPayload};
use serde_json::{json, Value};
use tracing::warn;

use crate::app::AppState;

/// POST /test/messages — `{"recipientId": ..., "text": ...}`, returns every
/// outbound message queued for that recipient during the turn.
pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TestRestPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let recipient_id = payload.recipient_id.clone();
    let inbound = normalize_test_rest(payload);

    state.service.handle_inbound(inbound).await.map_err(|e| {
        warn!(error = %e, "conversation pipeline rejected test message");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})))
    })?;

    let outbound = match state.channels.get("test") {
        Some(channel) => channel.drain_outbound(&recipient_id).await,
        None => Vec::new(),
    };

    Ok(Json(json!({"messages": outbound})))
}
