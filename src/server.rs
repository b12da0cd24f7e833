use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::session::SessionStore;
use crate::{AppState, api, pages};

/// How often idle sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // HTML pages
        .route("/", get(pages::index))
        .route("/chat", post(pages::submit_chat))
        .route("/feedback", post(pages::submit_feedback))
        .route("/assistants/{type}/sync", post(pages::run_sync))
        // API routes
        .route("/api/chat", post(api::chat))
        .route("/api/sessions/{id}", delete(api::delete_session))
        .route("/api/sessions/{id}/messages", get(api::messages))
        .route("/api/feedback", post(api::submit_feedback))
        .route("/healthz", get(api::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Evict sessions idle for longer than `ttl`, once a minute.
pub fn spawn_session_sweeper(sessions: SessionStore, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle(ttl);
            if evicted > 0 {
                info!(
                    name: "session.evicted",
                    evicted,
                    remaining = sessions.len(),
                    "Evicted idle sessions"
                );
            }
        }
    })
}

/// Start the Axum server with the provided state.
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let server = &state.config.server;
    let addr = format!("{}:{}", server.host, server.port);
    let ttl = Duration::from_secs(server.session_ttl_secs);

    let sweeper = spawn_session_sweeper(state.sessions.clone(), ttl);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    let served = axum::serve(listener, app).await;
    sweeper.abort();
    served?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_idle_sessions() {
        let sessions = SessionStore::new();
        let session = sessions.create("ultimate", "asst_1");
        session.lock().await.transcript.push(Message::user("Hello"));
        std::thread::sleep(Duration::from_millis(2));

        let handle = spawn_session_sweeper(sessions.clone(), Duration::ZERO);
        tokio::time::sleep(SWEEP_INTERVAL + Duration::from_secs(1)).await;

        assert!(sessions.is_empty());
        handle.abort();
    }
}
