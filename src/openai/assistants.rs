//! Assistants API backend.
//!
//! Each session gets one server-side thread, created on its first turn. A
//! turn posts the user message to the thread, starts a streamed run of the
//! session's assistant, and concatenates the text deltas into the reply.

use futures::StreamExt;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{OpenAiClient, sse};
use crate::error::RemoteServiceError;
use crate::relay::{AssistantBackend, ConversationContext};

/// Run events that end the stream without a usable reply.
const FAILED_RUN_EVENTS: &[&str] = &[
    "thread.run.failed",
    "thread.run.cancelled",
    "thread.run.expired",
    "thread.run.incomplete",
    "thread.run.requires_action",
];

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// Backend for `/v1/threads`.
#[derive(Debug, Clone)]
pub struct AssistantsBackend {
    client: OpenAiClient,
}

impl AssistantsBackend {
    #[must_use]
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    /// Create an empty thread and return its id.
    pub async fn create_thread(&self) -> Result<String, RemoteServiceError> {
        let created: Created =
            OpenAiClient::send_json(self.client.request(Method::POST, "threads").json(&json!({})))
                .await?;
        tracing::info!(name: "assistant.thread.created", thread_id = %created.id, "New thread created");
        Ok(created.id)
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), RemoteServiceError> {
        let _: Created = OpenAiClient::send_json(
            self.client
                .request(Method::POST, &format!("threads/{thread_id}/messages"))
                .json(&json!({ "role": "user", "content": text })),
        )
        .await?;
        Ok(())
    }

    /// Stream a run of `assistant_id` on the thread and collect its reply.
    ///
    /// `run` records the run id and whether the run reached a terminal
    /// status, so a caller can clean up a run that is still active.
    async fn run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        run: &mut RunState,
    ) -> Result<String, RemoteServiceError> {
        let resp = OpenAiClient::send(
            self.client
                .request(Method::POST, &format!("threads/{thread_id}/runs"))
                .json(&json!({ "assistant_id": assistant_id, "stream": true })),
        )
        .await?;
        run.started = true;

        let frames = sse::frames(resp);
        futures::pin_mut!(frames);

        let mut reply = String::new();

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            match frame.event.as_deref() {
                Some("thread.run.created") => {
                    let created: Created = serde_json::from_str(&frame.data)?;
                    run.id = Some(created.id);
                }
                Some("thread.message.delta") => {
                    let v: Value = serde_json::from_str(&frame.data)?;
                    push_text_delta(&v, &mut reply);
                }
                Some("thread.run.completed") => run.finished = true,
                Some(event) if FAILED_RUN_EVENTS.contains(&event) => {
                    run.finished = event != "thread.run.requires_action";
                    return Err(run_error(event, &frame.data));
                }
                Some("error") => return Err(stream_error(&frame.data)),
                Some("done") => break,
                _ => {
                    tracing::trace!(thread_id = %thread_id, event = ?frame.event, "Ignoring run event");
                }
            }
        }

        if !run.finished {
            return Err(RemoteServiceError::Protocol(
                "stream ended before the run completed".to_string(),
            ));
        }
        Ok(reply)
    }

    /// Cancel an active run. Returns whether the service accepted it.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> bool {
        let result: Result<Created, _> = OpenAiClient::send_json(
            self.client
                .request(Method::POST, &format!("threads/{thread_id}/runs/{run_id}/cancel")),
        )
        .await;
        match result {
            Ok(_) => {
                tracing::info!(name: "assistant.run.cancelled", thread_id = %thread_id, run_id = %run_id, "Cancelled unfinished run");
                true
            }
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, run_id = %run_id, error = %e, "Failed to cancel run");
                false
            }
        }
    }
}

/// Progress of one streamed run.
#[derive(Debug, Default)]
struct RunState {
    /// The run request was accepted and a stream opened.
    started: bool,
    id: Option<String>,
    /// The run reached `completed`, `failed`, `cancelled`, `expired`, or `incomplete`.
    finished: bool,
}

#[async_trait::async_trait]
impl AssistantBackend for AssistantsBackend {
    async fn send_message(
        &self,
        ctx: ConversationContext<'_>,
        text: &str,
    ) -> Result<String, RemoteServiceError> {
        let thread_id = match ctx.thread_id.as_ref() {
            Some(id) => id.clone(),
            None => {
                let id = self.create_thread().await?;
                *ctx.thread_id = Some(id.clone());
                id
            }
        };

        self.add_user_message(&thread_id, text).await?;
        tracing::debug!(thread_id = %thread_id, assistant_id = %ctx.assistant_id, "Starting run");

        let mut run = RunState::default();
        let result = self.run(&thread_id, ctx.assistant_id, &mut run).await;

        // An active run blocks new messages on the thread until it expires.
        if result.is_err() && run.started && !run.finished {
            let cancelled = match run.id.as_deref() {
                Some(run_id) => self.cancel_run(&thread_id, run_id).await,
                None => false,
            };
            if !cancelled {
                tracing::warn!(thread_id = %thread_id, "Dropping thread with an active run, next turn starts a new one");
                *ctx.thread_id = None;
            }
        }
        result
    }

    fn name(&self) -> &'static str {
        "assistants"
    }
}

/// Append the text parts of a `thread.message.delta` payload.
fn push_text_delta(v: &Value, out: &mut String) {
    let Some(parts) = v["delta"]["content"].as_array() else {
        return;
    };
    for part in parts {
        if part["type"] == "text"
            && let Some(text) = part["text"]["value"].as_str()
        {
            out.push_str(text);
        }
    }
}

fn run_error(event: &str, data: &str) -> RemoteServiceError {
    let status = event.trim_start_matches("thread.run.").to_string();
    let v: Value = serde_json::from_str(data).unwrap_or(Value::Null);
    let message = v["last_error"]["message"]
        .as_str()
        .or_else(|| v["incomplete_details"]["reason"].as_str())
        .map_or_else(
            || {
                if status == "requires_action" {
                    "assistant requested a tool call, which this relay does not handle".to_string()
                } else {
                    "no details provided".to_string()
                }
            },
            ToString::to_string,
        );
    RemoteServiceError::Run { status, message }
}

fn stream_error(data: &str) -> RemoteServiceError {
    let v: Value = serde_json::from_str(data).unwrap_or(Value::Null);
    let message = v["message"]
        .as_str()
        .or_else(|| v["error"]["message"].as_str())
        .unwrap_or(data);
    RemoteServiceError::Protocol(message.to_string())
}
