use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assistant_relay::AppState;
use assistant_relay::config::{
    ApiKey, AppConfig, AssistantProfile, BackendKind, KnowledgeConfig, LoggingConfig, OpenAiConfig,
    ServerConfig,
};
use assistant_relay::error::RemoteServiceError;
use assistant_relay::knowledge::{
    FileBatch, FileCounts, KnowledgeSync, SyncSettings, VectorStoreApi, VectorStoreFile,
};
use assistant_relay::openai::{OpenAiClient, OpenAiSettings, OpenAiVectorStores};
use assistant_relay::relay::{AssistantBackend, ChatRelay, ConversationContext};
use assistant_relay::server::build_router;
use assistant_relay::session::SessionStore;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Replies with the text and the amount of prior history; fails on "fail".
struct EchoBackend;

#[async_trait::async_trait]
impl AssistantBackend for EchoBackend {
    async fn send_message(
        &self,
        ctx: ConversationContext<'_>,
        text: &str,
    ) -> Result<String, RemoteServiceError> {
        if text.contains("fail") {
            return Err(RemoteServiceError::Status {
                status: 429,
                message: "Rate limit reached".to_string(),
            });
        }
        Ok(format!("Echo: {text} ({})", ctx.history.len()))
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

fn test_config() -> AppConfig {
    let mut assistants = HashMap::new();
    assistants.insert(
        "ultimate".to_string(),
        AssistantProfile {
            id: "asst_ultimate".to_string(),
            title: "终极助手".to_string(),
            icon: "🚀".to_string(),
            description: "Ask me anything".to_string(),
            llm_txt_url: None,
            instructions: None,
        },
    );

    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            session_ttl_secs: 3600,
        },
        openai: OpenAiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            project: None,
            backend: BackendKind::Assistants,
            model: "gpt-4o-mini".to_string(),
            request_timeout_secs: Some(1),
            poll_interval_ms: 10,
        },
        logging: LoggingConfig {
            filter: "info".to_string(),
            dir: None,
        },
        knowledge: KnowledgeConfig {
            work_dir: std::env::temp_dir().display().to_string(),
            max_concurrent_uploads: 1,
            batch_size: 10,
            max_attempts: 1,
        },
        assistants,
    }
}

fn test_server() -> (TestServer, SessionStore) {
    let config = test_config();
    let client = OpenAiClient::new(OpenAiSettings {
        base_url: config.openai.base_url.clone(),
        api_key: ApiKey::new("sk-test").unwrap(),
        project: None,
        model: config.openai.model.clone(),
        request_timeout: Some(Duration::from_secs(1)),
        poll_interval: Duration::from_millis(10),
    })
    .unwrap();
    server_with(config, Arc::new(OpenAiVectorStores::new(client)))
}

fn server_with(config: AppConfig, store: Arc<dyn VectorStoreApi>) -> (TestServer, SessionStore) {
    let knowledge = KnowledgeSync::new(store, SyncSettings::from(&config.knowledge));

    let sessions = SessionStore::new();
    let state = AppState {
        relay: Arc::new(ChatRelay::new(Arc::new(EchoBackend)).with_profiles(config.assistants.clone())),
        config: Arc::new(config),
        sessions: sessions.clone(),
        knowledge: Arc::new(knowledge),
    };

    (TestServer::new(build_router(state)).unwrap(), sessions)
}

/// Vector store service holding uploads in memory.
#[derive(Debug, Default)]
struct MemoryVectorStores {
    attached: Mutex<Vec<String>>,
    files: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl VectorStoreApi for MemoryVectorStores {
    async fn vector_store_ids(&self, _assistant_id: &str) -> Result<Vec<String>, RemoteServiceError> {
        Ok(self.attached.lock().unwrap().clone())
    }

    async fn attach_vector_stores(
        &self,
        _assistant_id: &str,
        vector_store_ids: &[String],
    ) -> Result<(), RemoteServiceError> {
        *self.attached.lock().unwrap() = vector_store_ids.to_vec();
        Ok(())
    }

    async fn create_vector_store(
        &self,
        _name: &str,
        _expires_after_days: u32,
    ) -> Result<String, RemoteServiceError> {
        Ok("vs_docs".to_string())
    }

    async fn vector_store_status(&self, _vector_store_id: &str) -> Result<String, RemoteServiceError> {
        Ok("completed".to_string())
    }

    async fn update_vector_store(
        &self,
        _vector_store_id: &str,
        _name: &str,
        _expires_after_days: u32,
    ) -> Result<(), RemoteServiceError> {
        Ok(())
    }

    async fn delete_vector_store(&self, _vector_store_id: &str) -> Result<bool, RemoteServiceError> {
        Ok(true)
    }

    async fn list_files(
        &self,
        _vector_store_id: &str,
        status_filter: Option<&str>,
    ) -> Result<Vec<VectorStoreFile>, RemoteServiceError> {
        if status_filter.is_some() {
            return Ok(Vec::new());
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|id| VectorStoreFile {
                id: id.clone(),
                status: "completed".to_string(),
            })
            .collect())
    }

    async fn remove_file_from_store(
        &self,
        _vector_store_id: &str,
        file_id: &str,
    ) -> Result<bool, RemoteServiceError> {
        self.files.lock().unwrap().retain(|f| f != file_id);
        Ok(true)
    }

    async fn delete_file(&self, _file_id: &str) -> Result<bool, RemoteServiceError> {
        Ok(true)
    }

    async fn upload_file(&self, path: &Path) -> Result<String, RemoteServiceError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("file_{name}"))
    }

    async fn create_file_batch_and_poll(
        &self,
        _vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch, RemoteServiceError> {
        self.files.lock().unwrap().extend(file_ids.iter().cloned());
        let count = u64::try_from(file_ids.len()).unwrap();
        Ok(FileBatch {
            id: "vsfb_1".to_string(),
            status: "completed".to_string(),
            file_counts: FileCounts {
                completed: count,
                total: count,
                ..FileCounts::default()
            },
        })
    }
}

fn session_from_location(location: &str) -> String {
    location
        .split("session=")
        .nth(1)
        .expect("redirect carries the session")
        .to_string()
}

#[tokio::test]
async fn unknown_assistant_shows_hello_page() {
    let (server, _) = test_server();

    for response in [
        server.get("/").await,
        server.get("/").add_query_param("type", "nobody").await,
    ] {
        response.assert_status_ok();
        let html = response.text();
        assert!(html.contains("<h1>Hello</h1>"));
        assert!(!html.contains("<form"));
    }
}

#[tokio::test]
async fn assistant_page_waits_for_the_first_message() {
    let (server, sessions) = test_server();

    for response in [
        server.get("/").add_query_param("type", "ultimate").await,
        server
            .get("/")
            .add_query_param("type", "ultimate")
            .add_query_param("session", "expired")
            .await,
    ] {
        response.assert_status_ok();
        let html = response.text();
        assert!(html.contains("<title>🚀 终极助手</title>"));
        assert!(html.contains("Ask me anything"));
        assert!(html.contains("请输入您的问题..."));
        assert!(!html.contains(r#"name="session_id""#));
    }
    assert!(sessions.is_empty());

    let response = server
        .post("/chat")
        .form(&[("assistant_type", "ultimate"), ("message", "Hello")])
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(sessions.len(), 1);

    let id = sessions.list_ids().remove(0);
    let html = server
        .get("/")
        .add_query_param("type", "ultimate")
        .add_query_param("session", &id)
        .await
        .text();
    assert!(html.contains(&format!(r#"name="session_id" value="{id}""#)));
}

#[tokio::test]
async fn form_turns_redirect_back_to_the_transcript() {
    let (server, _) = test_server();

    let response = server
        .post("/chat")
        .form(&[("assistant_type", "ultimate"), ("message", "Hello")])
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    let location = response.header("location").to_str().unwrap().to_string();
    assert!(location.starts_with("/?type=ultimate&session="));
    let session_id = session_from_location(&location);

    let response = server
        .post("/chat")
        .form(&[
            ("assistant_type", "ultimate"),
            ("session_id", session_id.as_str()),
            ("message", "Bye"),
        ])
        .await;
    response.assert_status(StatusCode::SEE_OTHER);

    let html = server
        .get("/")
        .add_query_param("type", "ultimate")
        .add_query_param("session", &session_id)
        .await
        .text();
    let positions: Vec<usize> = ["<p>Hello</p>", "<p>Echo: Hello (0)</p>", "<p>Bye</p>", "<p>Echo: Bye (2)</p>"]
        .iter()
        .map(|needle| html.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(html.matches(r#"action="/feedback""#).count(), 2);
}

#[tokio::test]
async fn failed_form_turn_shows_inline_error() {
    let (server, _) = test_server();

    let response = server
        .post("/chat")
        .form(&[("assistant_type", "ultimate"), ("message", "please fail")])
        .await;
    let session_id = session_from_location(response.header("location").to_str().unwrap());

    let html = server
        .get("/")
        .add_query_param("type", "ultimate")
        .add_query_param("session", &session_id)
        .await
        .text();
    assert!(html.contains("<p>please fail</p>"));
    assert!(html.contains(r#"role="alert""#));
    assert!(html.contains("Rate limit reached"));
}

#[tokio::test]
async fn api_chat_builds_alternating_transcript() {
    let (server, _) = test_server();

    let first: Value = server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "ultimate", "message": "Hello" }))
        .await
        .json();
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert_eq!(first["reply"], "Echo: Hello (0)");

    let second = server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "ultimate", "session_id": session_id, "message": "Bye" }))
        .await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>()["reply"], "Echo: Bye (2)");

    let messages: Value = server
        .get(&format!("/api/sessions/{session_id}/messages"))
        .await
        .json();
    assert_eq!(
        messages,
        json!([
            { "role": "user", "content": "Hello" },
            { "role": "assistant", "content": "Echo: Hello (0)" },
            { "role": "user", "content": "Bye" },
            { "role": "assistant", "content": "Echo: Bye (2)" }
        ])
    );
}

#[tokio::test]
async fn api_chat_failure_keeps_user_message() {
    let (server, _) = test_server();

    let first: Value = server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "ultimate", "message": "Hello" }))
        .await
        .json();
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let response = server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "ultimate", "session_id": session_id, "message": "fail now" }))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    assert!(
        response.json::<Value>()["error"]
            .as_str()
            .unwrap()
            .contains("Rate limit reached")
    );

    let messages: Value = server
        .get(&format!("/api/sessions/{session_id}/messages"))
        .await
        .json();
    let roles: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user"]);
    assert_eq!(messages[2]["content"], "fail now");
}

#[tokio::test]
async fn api_chat_rejects_bad_requests() {
    let (server, sessions) = test_server();

    server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "ultimate", "message": "   " }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert!(sessions.is_empty());

    server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "nobody", "message": "Hello" }))
        .await
        .assert_status_not_found();

    server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "ultimate", "session_id": "missing", "message": "Hello" }))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn feedback_must_target_an_assistant_reply() {
    let (server, _) = test_server();

    let first: Value = server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "ultimate", "message": "Hello" }))
        .await
        .json();
    let session_id = first["session_id"].as_str().unwrap().to_string();

    server
        .post("/api/feedback")
        .json(&json!({ "session_id": session_id, "message_index": 1, "score": "👍", "text": "great" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    server
        .post("/api/feedback")
        .json(&json!({ "session_id": session_id, "message_index": 0, "score": "👎" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .post("/api/feedback")
        .json(&json!({ "session_id": "missing", "message_index": 1, "score": "👍" }))
        .await
        .assert_status_not_found();

    let response = server
        .post("/feedback")
        .form(&[
            ("assistant_type", "ultimate"),
            ("session_id", session_id.as_str()),
            ("message_index", "1"),
            ("score", "👎"),
            ("text", ""),
        ])
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(
        response.header("location").to_str().unwrap(),
        format!("/?type=ultimate&session={session_id}")
    );
}

#[tokio::test]
async fn deleting_a_session_ends_it() {
    let (server, sessions) = test_server();

    let first: Value = server
        .post("/api/chat")
        .json(&json!({ "assistant_type": "ultimate", "message": "Hello" }))
        .await
        .json();
    let session_id = first["session_id"].as_str().unwrap().to_string();

    server
        .delete(&format!("/api/sessions/{session_id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert!(sessions.is_empty());

    server
        .delete(&format!("/api/sessions/{session_id}"))
        .await
        .assert_status_not_found();
    server
        .get(&format!("/api/sessions/{session_id}/messages"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn sync_pages_confirm_then_report() {
    let (server, _) = test_server();

    let html = server
        .get("/")
        .add_query_param("type", "ultimate")
        .add_query_param("sync", "true")
        .await
        .text();
    assert!(html.contains(r#"action="/assistants/ultimate/sync""#));

    // No llm_txt_url configured, so the sync stops before any network call.
    let response = server.post("/assistants/ultimate/sync").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("同步失败"));
    assert!(html.contains(r#"href="/?type=ultimate""#));

    server
        .post("/assistants/nobody/sync")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn sync_replaces_documents_through_the_router() {
    let docs = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/llms.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "# Docs\n- [Setup]({0}/setup.md)\n- [Usage]({0}/usage.md)\n",
            docs.uri()
        )))
        .mount(&docs)
        .await;
    for page in ["/setup.md", "/usage.md"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Page"))
            .mount(&docs)
            .await;
    }

    let work = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.knowledge.work_dir = work.path().display().to_string();
    if let Some(profile) = config.assistants.get_mut("ultimate") {
        profile.llm_txt_url = Some(format!("{}/llms.txt", docs.uri()));
    }
    let store = Arc::new(MemoryVectorStores::default());
    let (server, _) = server_with(config, store.clone());

    let response = server.post("/assistants/ultimate/sync").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("同步完成"));
    assert!(html.contains("<li>Setup.md</li>"));
    assert!(html.contains("<code>vs_docs</code>"));

    assert_eq!(*store.attached.lock().unwrap(), vec!["vs_docs"]);
    let mut files = store.files.lock().unwrap().clone();
    files.sort();
    assert_eq!(files, vec!["file_Setup", "file_Usage"]);
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (server, _) = test_server();
    let response = server.get("/healthz").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}
