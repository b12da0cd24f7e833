//! Assistant Relay server
//!
//! Entry point: loads configuration, initializes logging, and serves the
//! chat pages.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use dotenvy::dotenv;
use tracing::info;

use assistant_relay::{
    AppState,
    config::{self, AppConfig},
    knowledge::{KnowledgeSync, SyncSettings},
    openai::{self, OpenAiClient, OpenAiSettings, OpenAiVectorStores},
    relay::ChatRelay,
    server,
    session::SessionStore,
    telemetry,
};

#[tokio::main]
async fn main() {
    // Load .env (if present)
    let _ = dotenv();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = telemetry::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!(name: "server.failed", error = %e, "Server terminated");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    // A missing key is fatal before any network call.
    let api_key = config::load_api_key()?;
    let settings = OpenAiSettings::from_config(&config.openai, api_key)?;

    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        backend = ?config.openai.backend,
        model = %settings.model,
        assistants = config.assistants.len(),
        "Assistant configuration loaded"
    );

    let client = OpenAiClient::new(settings)?;
    let backend = openai::backend_for(config.openai.backend, client.clone());
    let relay = ChatRelay::new(backend).with_profiles(config.assistants.clone());

    let knowledge = KnowledgeSync::new(
        Arc::new(OpenAiVectorStores::new(client)),
        SyncSettings::from(&config.knowledge),
    );

    let state = AppState {
        config: Arc::new(config),
        relay: Arc::new(relay),
        sessions: SessionStore::new(),
        knowledge: Arc::new(knowledge),
    };

    server::start_server(state).await
}
