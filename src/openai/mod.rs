//! OpenAI HTTP client and the backends built on it.
//!
//! # Backends
//!
//! - [`AssistantsBackend`]: Assistants API threads and streamed runs (`/v1/threads`)
//! - [`ChatCompletionsBackend`]: Chat Completions API (`/v1/chat/completions`)
//! - [`OpenAiVectorStores`]: vector store and file endpoints used by knowledge sync
//!
//! All of them share one [`OpenAiClient`], which owns the `reqwest` client,
//! authentication headers, and error decoding.

pub mod assistants;
pub mod chat_completions;
pub mod sse;
pub mod vector_stores;

pub use assistants::AssistantsBackend;
pub use chat_completions::ChatCompletionsBackend;
pub use vector_stores::OpenAiVectorStores;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::config::{ApiKey, BackendKind, OpenAiConfig};
use crate::error::{ConfigError, RemoteServiceError};
use crate::relay::AssistantBackend;

/// Connection settings for the OpenAI API.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// Base URL without the `/v1` suffix (e.g., `https://api.openai.com`).
    pub base_url: String,
    pub api_key: ApiKey,
    /// Sent as `OpenAI-Project` when set.
    pub project: Option<String>,
    /// Model for the chat completions backend.
    pub model: String,
    /// Whole-request timeout; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Delay between file batch status checks.
    pub poll_interval: Duration,
}

impl OpenAiSettings {
    /// Build settings from configuration and a loaded credential.
    pub fn from_config(config: &OpenAiConfig, api_key: ApiKey) -> Result<Self, ConfigError> {
        let parsed = url::Url::parse(&config.base_url)
            .map_err(|e| ConfigError::Invalid(format!("openai.base_url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "openai.base_url must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        if config.model.trim().is_empty() {
            return Err(ConfigError::Invalid("openai.model cannot be empty".to_string()));
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            project: config.project.clone().filter(|p| !p.trim().is_empty()),
            model: config.model.clone(),
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }
}

/// Authenticated client for the OpenAI REST API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))?;
        Ok(Self { http, settings })
    }

    #[must_use]
    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    /// Start a request against `/v1/{path}` with auth headers applied.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/v1/{}",
            self.settings.base_url,
            path.trim_start_matches('/')
        );
        let mut rb = self
            .http
            .request(method, url)
            .bearer_auth(self.settings.api_key.expose())
            .header("OpenAI-Beta", "assistants=v2");
        if let Some(project) = &self.settings.project {
            rb = rb.header("OpenAI-Project", project);
        }
        rb
    }

    /// Send a request, turning non-success statuses into [`RemoteServiceError::Status`].
    pub(crate) async fn send(rb: RequestBuilder) -> Result<Response, RemoteServiceError> {
        let resp = rb.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(ToString::to_string))
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("error").to_string()
                } else {
                    body
                }
            });

        Err(RemoteServiceError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Send a request and decode a JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        rb: RequestBuilder,
    ) -> Result<T, RemoteServiceError> {
        let resp = Self::send(rb).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Construct the configured chat backend.
#[must_use]
pub fn backend_for(kind: BackendKind, client: OpenAiClient) -> Arc<dyn AssistantBackend> {
    match kind {
        BackendKind::Assistants => Arc::new(AssistantsBackend::new(client)),
        BackendKind::Chat => Arc::new(ChatCompletionsBackend::new(client)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Client pointed at a mock server.
    pub fn client_for(base_url: &str) -> OpenAiClient {
        OpenAiClient::new(OpenAiSettings {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: ApiKey::new("sk-test").unwrap(),
            project: Some("proj_test".to_string()),
            model: "gpt-4o-mini".to_string(),
            request_timeout: Some(Duration::from_secs(5)),
            poll_interval: Duration::from_millis(1),
        })
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn openai_config(base_url: &str) -> OpenAiConfig {
        OpenAiConfig {
            base_url: base_url.to_string(),
            project: Some(String::new()),
            backend: BackendKind::Assistants,
            model: "gpt-4o-mini".to_string(),
            request_timeout_secs: Some(30),
            poll_interval_ms: 500,
        }
    }

    #[test]
    fn settings_validate_base_url() {
        let key = ApiKey::new("sk-test").unwrap();
        let settings =
            OpenAiSettings::from_config(&openai_config("https://api.openai.com/"), key.clone())
                .unwrap();
        assert_eq!(settings.base_url, "https://api.openai.com");
        assert_eq!(settings.project, None);
        assert_eq!(settings.request_timeout, Some(Duration::from_secs(30)));

        assert!(OpenAiSettings::from_config(&openai_config("not a url"), key.clone()).is_err());
        assert!(OpenAiSettings::from_config(&openai_config("ftp://example.com"), key).is_err());
    }

    #[tokio::test]
    async fn error_status_carries_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/assistants/asst_1"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("OpenAI-Beta", "assistants=v2"))
            .and(header("OpenAI-Project", "proj_test"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let client = test_support::client_for(&server.uri());
        let err = OpenAiClient::send(client.request(Method::GET, "assistants/asst_1"))
            .await
            .unwrap_err();

        match err {
            RemoteServiceError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
