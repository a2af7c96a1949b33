//! Admin surface backing the `conversa-cli session clear` subcommand
//! (§6.7). Sessions are process-local (§3.1/§5), so clearing one requires
//! reaching the gateway node holding the lease over HTTP rather than a
//! direct store write the way `flows load/list/toggle` operate.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;

pub async fn clear_session_handler(
    State(state): State<Arc<AppState>>,
    Path(recipient): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(expected) = &state.config.gateway.admin_token {
        let presented = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "missing or invalid admin token"})),
            ));
        }
    }

    state.sessions.clear(&recipient).await;
    info!(recipient = %recipient, "session cleared via admin endpoint");
    Ok(Json(json!({"ok": true})))
}
