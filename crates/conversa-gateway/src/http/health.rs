use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health — liveness probe: server metadata, channel status, and LLM
/// provider health (§6.5's passive monitoring surfaced for operators).
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let providers: Vec<Value> = state
        .health
        .all_entries()
        .into_iter()
        .map(|e| {
            json!({
                "name": e.name,
                "status": e.status,
                "avg_latency_ms": e.avg_latency_ms,
            })
        })
        .collect();

    let channels: Vec<Value> = state
        .channels
        .statuses()
        .into_iter()
        .map(|(name, status)| json!({"name": name, "status": status}))
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("CONVERSA_GIT_SHA"),
        "providers": providers,
        "channels": channels,
    }))
}
