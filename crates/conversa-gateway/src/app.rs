use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use conversa_channels::ChannelManager;
use conversa_core::config::OrchestratorConfig;
use conversa_llm::HealthTracker;
use conversa_service::ConversationService;
use conversa_sessions::SessionStore;

/// Central shared state handed to every Axum handler.
pub struct AppState {
    pub config: OrchestratorConfig,
    pub service: Arc<ConversationService>,
    pub channels: Arc<ChannelManager>,
    pub sessions: Arc<dyn SessionStore>,
    pub health: Arc<HealthTracker>,
}

impl AppState {
    pub fn new(
        config: OrchestratorConfig,
        service: Arc<ConversationService>,
        channels: Arc<ChannelManager>,
        sessions: Arc<dyn SessionStore>,
        health: Arc<HealthTracker>,
    ) -> Self {
        Self {
            config,
            service,
            channels,
            sessions,
            health,
        }
    }
}

/// Assemble the full Axum router (§6.1/§6.7 surface).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::http::ws::ws_handler))
        .route("/test/messages", post(crate::http::test_rest::send_handler))
        .route("/webhooks/{source}", post(crate::http::webhooks::webhook_handler))
        .route(
            "/admin/sessions/{recipient}/clear",
            post(crate::http::admin::clear_session_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
