//! Admin CLI for the conversation orchestrator (§6.7): manage flow
//! definitions directly against the shared SQLite store, and reach a
//! running gateway node to clear a recipient's in-memory session.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use conversa_core::config::OrchestratorConfig;
use conversa_flow::FlowDefinition;
use conversa_persistence::{init_db, FlowDefinitionStore};
use tracing::{error, info};

/// Exit codes from the admin CLI contract (§6.7, §7).
const EXIT_OK: u8 = 0;
const EXIT_VALIDATION_ERROR: u8 = 2;
const EXIT_PERSISTENCE_ERROR: u8 = 3;
const EXIT_UPSTREAM_UNAVAILABLE: u8 = 4;

#[derive(Parser)]
#[command(name = "conversa-cli", about = "Admin CLI for the conversation orchestrator")]
struct Cli {
    /// Path to conversa.toml. Falls back to CONVERSA_CONFIG / ~/.conversa/conversa.toml.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage flow definitions in the relational store.
    Flows {
        #[command(subcommand)]
        action: FlowsAction,
    },
    /// Manage a recipient's live session on a running gateway.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum FlowsAction {
    /// Load every `*.json` flow definition in `dir` into the store.
    Load { dir: PathBuf },
    /// List flow summaries, optionally filtered.
    List {
        #[arg(long)]
        module: Option<String>,
        #[arg(long)]
        enabled: bool,
    },
    /// Flip a flow's enabled bit.
    Toggle { id: String },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Force-end any in-flight run and drop the recipient's session.
    Clear { recipient: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "conversa_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = OrchestratorConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        OrchestratorConfig::default()
    });

    let code = match cli.command {
        Command::Flows { action } => run_flows(&config, action),
        Command::Session { action } => run_session(&config, action).await,
    };

    ExitCode::from(code)
}

fn open_store(config: &OrchestratorConfig) -> anyhow::Result<std::sync::Arc<FlowDefinitionStore>> {
    let conn = rusqlite::Connection::open(&config.database.path)?;
    init_db(&conn)?;
    Ok(FlowDefinitionStore::new(conn))
}

fn run_flows(config: &OrchestratorConfig, action: FlowsAction) -> u8 {
    let store = match open_store(config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open flow store");
            return EXIT_PERSISTENCE_ERROR;
        }
    };

    match action {
        FlowsAction::Load { dir } => load_flows(&store, &dir),
        FlowsAction::List { module, enabled } => list_flows(&store, module.as_deref(), enabled),
        FlowsAction::Toggle { id } => toggle_flow(&store, &id),
    }
}

fn load_flows(store: &FlowDefinitionStore, dir: &PathBuf) -> u8 {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "failed to read flow directory");
            return EXIT_VALIDATION_ERROR;
        }
    };

    let mut loaded = 0;
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read flow file");
                return EXIT_VALIDATION_ERROR;
            }
        };

        let flow: FlowDefinition = match serde_json::from_str(&body) {
            Ok(flow) => flow,
            Err(e) => {
                error!(path = %path.display(), error = %e, "flow JSON is malformed");
                return EXIT_VALIDATION_ERROR;
            }
        };

        if let Err(e) = store.upsert(&flow) {
            error!(path = %path.display(), error = %e, "flow failed to load");
            return EXIT_VALIDATION_ERROR;
        }

        info!(id = %flow.id, version = flow.version, "flow loaded");
        loaded += 1;
    }

    info!(loaded, dir = %dir.display(), "flow load complete");
    EXIT_OK
}

fn list_flows(store: &FlowDefinitionStore, module: Option<&str>, enabled_only: bool) -> u8 {
    match store.list(module, enabled_only) {
        Ok(rows) => {
            for row in rows {
                println!(
                    "{}\tv{}\t{}\t{}\t{}\t{}",
                    row.id,
                    row.version,
                    row.module,
                    row.trigger.as_deref().unwrap_or("-"),
                    row.name,
                    if row.enabled { "enabled" } else { "disabled" },
                );
            }
            EXIT_OK
        }
        Err(e) => {
            error!(error = %e, "failed to list flows");
            EXIT_PERSISTENCE_ERROR
        }
    }
}

fn toggle_flow(store: &FlowDefinitionStore, id: &str) -> u8 {
    match store.toggle(id) {
        Ok(enabled) => {
            println!("{id}: {}", if enabled { "enabled" } else { "disabled" });
            EXIT_OK
        }
        Err(e) => {
            error!(id = %id, error = %e, "failed to toggle flow");
            EXIT_PERSISTENCE_ERROR
        }
    }
}

async fn run_session(config: &OrchestratorConfig, action: SessionAction) -> u8 {
    let SessionAction::Clear { recipient } = action;

    let url = format!(
        "http://{}:{}/admin/sessions/{}/clear",
        loopback_host(&config.gateway.bind),
        config.gateway.port,
        recipient,
    );

    let client = reqwest::Client::new();
    let mut req = client.post(&url);
    if let Some(token) = &config.gateway.admin_token {
        req = req.bearer_auth(token);
    }

    match req.send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(recipient = %recipient, "session cleared");
            EXIT_OK
        }
        Ok(resp) => {
            error!(recipient = %recipient, status = %resp.status(), "gateway refused session clear");
            EXIT_UPSTREAM_UNAVAILABLE
        }
        Err(e) => {
            error!(recipient = %recipient, error = %e, "gateway unreachable");
            EXIT_UPSTREAM_UNAVAILABLE
        }
    }
}

/// `0.0.0.0` isn't dialable — loop back to the local host for the CLI's own
/// HTTP call when the gateway is configured to listen on all interfaces.
fn loopback_host(bind: &str) -> &str {
    if bind == "0.0.0.0" {
        "127.0.0.1"
    } else {
        bind
    }
}
