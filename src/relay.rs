//! The chat relay: one user message in, one assistant reply out.
//!
//! [`ChatRelay::send`] appends the user's message to the session transcript,
//! asks the remote assistant for a reply through an [`AssistantBackend`], and
//! appends the reply. A failed call leaves the user message in place so the
//! user can resend it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AssistantProfile;
use crate::error::RemoteServiceError;
use crate::session::{ChatSession, Message};

/// What a backend gets to see of the conversation for one turn.
#[derive(Debug)]
pub struct ConversationContext<'a> {
    /// Remote assistant id of the session.
    pub assistant_id: &'a str,
    /// Server-side thread handle; backends that use threads create it on first use.
    pub thread_id: &'a mut Option<String>,
    /// Messages before the one being sent, oldest first.
    pub history: &'a [Message],
    /// Optional system prompt from the assistant profile.
    pub instructions: Option<&'a str>,
}

/// Narrow boundary to the vendor-hosted assistant.
#[async_trait::async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Send `text` in the given conversation and return the full reply.
    async fn send_message(
        &self,
        ctx: ConversationContext<'_>,
        text: &str,
    ) -> Result<String, RemoteServiceError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Forwards user messages to a backend and records both sides of each turn.
#[derive(Clone)]
pub struct ChatRelay {
    backend: Arc<dyn AssistantBackend>,
    profiles: HashMap<String, AssistantProfile>,
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRelay")
            .field("backend", &self.backend.name())
            .field("profiles", &self.profiles.len())
            .finish()
    }
}

impl ChatRelay {
    #[must_use]
    pub fn new(backend: Arc<dyn AssistantBackend>) -> Self {
        Self {
            backend,
            profiles: HashMap::new(),
        }
    }

    /// Attach assistant profiles so their instructions reach the backend.
    #[must_use]
    pub fn with_profiles(mut self, profiles: HashMap<String, AssistantProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Run one turn.
    ///
    /// Returns `Ok(None)` without touching the transcript when `text` is
    /// empty or whitespace. On failure the user message stays appended, no
    /// assistant message is added, and the error is remembered in
    /// `session.last_error` for display.
    pub async fn send(
        &self,
        session: &mut ChatSession,
        text: &str,
    ) -> Result<Option<String>, RemoteServiceError> {
        if text.trim().is_empty() {
            tracing::debug!(session_id = %session.id(), "Ignoring empty message");
            return Ok(None);
        }

        session.touch();
        session.last_error = None;

        tracing::info!(
            name: "chat.user_input",
            session_id = %session.id(),
            assistant_type = %session.assistant_type(),
            length = text.len(),
            "User input"
        );
        tracing::debug!(session_id = %session.id(), content = %text, "User input content");

        let prior = session.transcript.len();
        session.transcript.push(Message::user(text));

        let assistant_id = session.assistant_id().to_string();
        let instructions = self
            .profiles
            .get(session.assistant_type())
            .and_then(|p| p.instructions.clone());

        let ctx = ConversationContext {
            assistant_id: &assistant_id,
            thread_id: &mut session.thread_id,
            history: &session.transcript.messages()[..prior],
            instructions: instructions.as_deref(),
        };

        let result = self.backend.send_message(ctx, text).await;
        session.touch();

        match result {
            Ok(reply) => {
                tracing::info!(
                    name: "chat.assistant_response",
                    session_id = %session.id(),
                    backend = self.backend.name(),
                    length = reply.len(),
                    "Assistant response"
                );
                tracing::debug!(session_id = %session.id(), content = %reply, "Assistant response content");
                session.transcript.push(Message::assistant(reply.clone()));
                Ok(Some(reply))
            }
            Err(e) => {
                tracing::error!(
                    name: "chat.remote_failure",
                    session_id = %session.id(),
                    backend = self.backend.name(),
                    error = %e,
                    "Assistant call failed"
                );
                session.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
