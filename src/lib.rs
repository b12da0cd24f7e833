//! Assistant Relay
//!
//! A server-rendered chat page that forwards each user message to a hosted
//! assistant (OpenAI Assistants, or an OpenAI-compatible chat completions
//! endpoint) and shows the running transcript.
//!
//! # Architecture
//!
//! - **Server**: Axum router with HTML pages and a JSON API
//! - **Relay**: one request/response round trip per turn, appended to an
//!   in-memory transcript
//! - **Backends**: OpenAI Assistants threads or Chat Completions behind one trait
//! - **Knowledge sync**: refresh an assistant's file-search documents from an
//!   `llm.txt` index
//!
//! # Modules
//!
//! - [`config`]: layered configuration and the API key
//! - [`relay`]: the chat turn and the [`relay::AssistantBackend`] trait
//! - [`session`]: transcripts and the session store
//! - [`openai`]: OpenAI HTTP client and backends
//! - [`knowledge`]: knowledge sync
//! - [`ui`], [`pages`], [`api`]: HTML and JSON surfaces

#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod error;
pub mod feedback;
pub mod knowledge;
pub mod openai;
pub mod pages;
pub mod relay;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod ui;

use std::sync::Arc;

use crate::config::{AppConfig, AssistantProfile};
use crate::knowledge::KnowledgeSync;
use crate::relay::ChatRelay;
use crate::session::{SessionStore, SharedSession};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Global configuration, including assistant profiles.
    pub config: Arc<AppConfig>,
    /// Runs chat turns against the configured backend.
    pub relay: Arc<ChatRelay>,
    /// Session store for conversation management.
    pub sessions: SessionStore,
    /// Knowledge sync for assistants with an `llm.txt` source.
    pub knowledge: Arc<KnowledgeSync>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("relay", &self.relay)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl AppState {
    #[must_use]
    pub fn profile(&self, assistant_type: &str) -> Option<&AssistantProfile> {
        self.config.assistant(assistant_type)
    }

    /// Existing session `id`, if it belongs to `assistant_type`.
    pub async fn existing_session(
        &self,
        assistant_type: &str,
        id: Option<&str>,
    ) -> Option<SharedSession> {
        let session = self.sessions.get(id?)?;
        let matches = session.lock().await.assistant_type() == assistant_type;
        matches.then_some(session)
    }

    /// Existing session `id` for `assistant_type`, or a new one.
    pub async fn session_for(
        &self,
        assistant_type: &str,
        profile: &AssistantProfile,
        id: Option<&str>,
    ) -> SharedSession {
        match self.existing_session(assistant_type, id).await {
            Some(session) => session,
            None => self.sessions.create(assistant_type, &profile.id),
        }
    }
}
