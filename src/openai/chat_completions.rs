//! OpenAI Chat Completions API backend.
//!
//! Replays the whole transcript to `/v1/chat/completions` on every turn and
//! concatenates the streamed content deltas. Useful for OpenAI-compatible
//! providers that do not implement the Assistants API.

use futures::StreamExt;
use reqwest::Method;
use serde_json::{Value, json};

use super::{OpenAiClient, sse};
use crate::error::RemoteServiceError;
use crate::relay::{AssistantBackend, ConversationContext};
use crate::session::Message;

/// Backend for `/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionsBackend {
    client: OpenAiClient,
}

impl ChatCompletionsBackend {
    #[must_use]
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

/// Wire messages for one request: system prompt, history, then the new text.
fn request_messages(instructions: Option<&str>, history: &[Message], text: &str) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(prompt) = instructions {
        messages.push(json!({ "role": "system", "content": prompt }));
    }
    messages.extend(
        history
            .iter()
            .map(|m| json!({ "role": m.role().as_str(), "content": m.content() })),
    );
    messages.push(json!({ "role": "user", "content": text }));
    messages
}

#[async_trait::async_trait]
impl AssistantBackend for ChatCompletionsBackend {
    async fn send_message(
        &self,
        ctx: ConversationContext<'_>,
        text: &str,
    ) -> Result<String, RemoteServiceError> {
        let body = json!({
            "model": self.client.settings().model,
            "stream": true,
            "messages": request_messages(ctx.instructions, ctx.history, text),
        });

        let resp =
            OpenAiClient::send(self.client.request(Method::POST, "chat/completions").json(&body))
                .await?;
        let frames = sse::frames(resp);
        futures::pin_mut!(frames);

        let mut reply = String::new();
        let mut finished = false;

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            if frame.is_done_marker() {
                finished = true;
                break;
            }

            let v: Value = serde_json::from_str(&frame.data)?;
            if let Some(message) = v["error"]["message"].as_str() {
                return Err(RemoteServiceError::Protocol(message.to_string()));
            }

            let choice = &v["choices"][0];
            if let Some(s) = choice["delta"]["content"].as_str() {
                reply.push_str(s);
            }
            if choice["finish_reason"].is_string() {
                finished = true;
            }
        }

        if !finished {
            return Err(RemoteServiceError::Protocol(
                "stream ended before the completion finished".to_string(),
            ));
        }
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "chat"
    }
}
