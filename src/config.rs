use std::collections::HashMap;
use std::env;
use std::fmt;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable holding the assistant service credential.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Remote backend: `assistants` or `chat`
    #[arg(long, env = "RELAY_BACKEND")]
    pub backend: Option<String>,

    /// Directory for daily log files
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub logging: LoggingConfig,
    pub knowledge: KnowledgeConfig,
    /// Assistant profiles keyed by assistant type (the `?type=` query value).
    #[serde(default)]
    pub assistants: HashMap<String, AssistantProfile>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Idle time after which a session is considered ended.
    pub session_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    #[serde(default)]
    pub project: Option<String>,
    pub backend: BackendKind,
    pub model: String,
    /// Unset means the HTTP client never times out a request.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_ms: u64,
}

/// Which remote API carries the conversation.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Assistants API: server-side thread, only new text is sent.
    Assistants,
    /// Chat Completions API: the transcript is replayed every turn.
    Chat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    pub work_dir: String,
    pub max_concurrent_uploads: usize,
    pub batch_size: usize,
    pub max_attempts: usize,
}

/// One configured assistant.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AssistantProfile {
    /// Remote assistant id (`asst_...`).
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    /// Index of markdown documents used by knowledge sync.
    #[serde(default)]
    pub llm_txt_url: Option<String>,
    /// System prompt for the chat completions backend.
    #[serde(default)]
    pub instructions: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8501)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.session_ttl_secs", 3600)?
            .set_default("openai.base_url", "https://api.openai.com")?
            .set_default("openai.backend", "assistants")?
            .set_default("openai.model", "gpt-4o-mini")?
            .set_default("openai.poll_interval_ms", 1000)?
            .set_default("logging.filter", "info")?
            .set_default("knowledge.work_dir", "tmp")?
            .set_default("knowledge.max_concurrent_uploads", 5)?
            .set_default("knowledge.batch_size", 100)?
            .set_default("knowledge.max_attempts", 3)?;

        // 2. Config file: explicit path is required, ./config.yaml is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables prefixed with RELAY_, e.g. RELAY_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env aliases) win over everything else
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(backend) = cli.backend {
            builder = builder.set_override("openai.backend", backend.to_lowercase())?;
        }
        if let Some(dir) = cli.log_dir {
            builder = builder.set_override("logging.dir", dir)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.knowledge.batch_size == 0 || self.knowledge.max_concurrent_uploads == 0 {
            return Err(ConfigError::Invalid(
                "knowledge.batch_size and knowledge.max_concurrent_uploads must be positive"
                    .to_string(),
            ));
        }
        if self.knowledge.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "knowledge.max_attempts must be at least 1".to_string(),
            ));
        }
        if let Some((key, _)) = self.assistants.iter().find(|(_, p)| p.id.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "assistant '{key}' has an empty id"
            )));
        }
        Ok(())
    }

    /// Look up an assistant profile by type.
    #[must_use]
    pub fn assistant(&self, assistant_type: &str) -> Option<&AssistantProfile> {
        self.assistants.get(assistant_type)
    }
}

/// Non-empty API credential. Its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(API_KEY_VAR));
        }
        Ok(Self(key.trim().to_string()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Read the assistant service credential from the environment.
pub fn load_api_key() -> Result<ApiKey, ConfigError> {
    let key = env::var(API_KEY_VAR)
        .ok()
        .ok_or(ConfigError::MissingCredential(API_KEY_VAR))?;
    ApiKey::new(key)
}
