use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use conversa_core::config::OrchestratorConfig;
use conversa_flow::builtin_registry;
use conversa_llm::HealthTracker;
use conversa_persistence::{
    init_db, ConversationLog, FlowDefinitionStore, FlowRunStore, TrainingSampleStore,
    UserProfileStore,
};
use conversa_preferences::PreferenceEnricher;
use conversa_router::IntentRouter;
use conversa_sessions::InMemorySessionStore;
use conversa_service::ConversationService;
use tracing::{info, warn};

mod app;
mod channels;
mod http;
mod llm;
mod nlu;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conversa_gateway=info,tower_http=info".into()),
        )
        .init();

    let config_path = std::env::var("CONVERSA_CONFIG").ok();
    let config = OrchestratorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        OrchestratorConfig::default()
    });

    if let Some(parent) = Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let flows = FlowDefinitionStore::new(open_conn(&config.database.path)?);
    let runs = FlowRunStore::new(open_conn(&config.database.path)?);
    let conversation_log = ConversationLog::new(open_conn(&config.database.path)?);
    let training = TrainingSampleStore::new(open_conn(&config.database.path)?);
    let profiles = UserProfileStore::new(open_conn(&config.database.path)?);

    let health = HealthTracker::new();
    let nlu_client = nlu::build_nlu_client(&config.nlu);
    let llm_router = llm::build_provider_router(&config.llm, health.clone());

    let registry = Arc::new(builtin_registry(llm_router.clone(), nlu_client.clone()));
    let router = Arc::new(IntentRouter::new(
        flows.clone(),
        nlu_client,
        config.nlu.high_confidence,
        config.routing.clone(),
    ));
    let enricher = PreferenceEnricher::new(llm_router, profiles, default_preference_model(&config));

    let sessions = InMemorySessionStore::new(config.session.ttl_secs);

    let mut channel_manager = channels::build_channel_manager(&config.channels);
    channel_manager.connect_all().await;
    let channel_manager = Arc::new(channel_manager);

    let service = ConversationService::new(
        sessions.clone(),
        channel_manager.clone(),
        flows,
        runs,
        conversation_log,
        training,
        registry,
        router,
        Arc::new(enricher),
        &config,
    );

    spawn_resume_loop(service.clone());

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(
        config,
        service,
        channel_manager,
        sessions,
        health,
    ));
    let router = app::build_router(state);

    let addr = format!("{bind}:{port}");
    info!("conversa-gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn open_conn(path: &str) -> anyhow::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    init_db(&conn)?;
    Ok(conn)
}

fn default_preference_model(config: &OrchestratorConfig) -> String {
    config
        .llm
        .anthropic
        .as_ref()
        .map(|a| a.model.clone())
        .or_else(|| config.llm.openai.as_ref().map(|o| o.model.clone()))
        .unwrap_or_else(|| "default".to_string())
}

/// Periodic tick that reconciles runs suspended past their input timeout
/// (§4.7 step 7 / §8 boundary behavior 11).
fn spawn_resume_loop(service: Arc<ConversationService>) {
    const TICK_SECS: u64 = 30;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(TICK_SECS));
        loop {
            ticker.tick().await;
            if let Err(e) = service.resume_timed_out_runs().await {
                warn!(error = %e, "failed to resume timed-out runs");
            }
        }
    });
}
