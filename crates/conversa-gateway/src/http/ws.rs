//! WebSocket ingress for the `web` platform (§6.1): client sends
//! `{"sessionId": ..., "message": ...}` text frames, server drains the
//! recipient's queued outbound messages after each inbound turn and sends
//! them back as JSON text frames, one per message.

use std::sync::Arc;

use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use conversa_channels::normalizer::{normalize_websocket, WebSocketPayload};
use tracing::{debug, warn};

use crate::app::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    while let Some(Ok(msg)) = socket.recv().await {
        let WsMessage::Text(text) = msg else {
            continue;
        };

        let payload: WebSocketPayload = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "malformed websocket frame");
                continue;
            }
        };

        let recipient_id = payload.session_id.clone();
        let inbound = normalize_websocket(payload);

        if let Err(e) = state.service.handle_inbound(inbound).await {
            warn!(error = %e, "conversation pipeline rejected websocket message");
            continue;
        }

        let Some(channel) = state.channels.get("web") else {
            continue;
        };
        let outbound = channel.drain_outbound(&recipient_id).await;
        debug!(recipient = %recipient_id, count = outbound.len(), "draining web outbound queue");

        for msg in outbound {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if socket.send(WsMessage::Text(json.into())).await.is_err() {
                return;
            }
        }
    }
}
