//! HTML page handlers.
//!
//! Forms post back and redirect to the assistant page (post/redirect/get), so
//! a reload never resubmits a message.

use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::AppState;
use crate::feedback::{self, Feedback, Score};
use crate::ui::{self, ChatView};

/// Query of the assistant page.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Assistant profile key.
    #[serde(rename = "type")]
    pub assistant_type: Option<String>,
    /// Session to show. Absent or unknown shows an empty transcript.
    pub session: Option<String>,
    /// `true` shows the knowledge sync confirmation instead of the chat.
    pub sync: Option<String>,
}

/// GET / - assistant page, sync confirmation, or the Hello page.
pub async fn index(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Response {
    let Some((assistant_type, profile)) = query
        .assistant_type
        .as_deref()
        .and_then(|t| state.profile(t).map(|p| (t, p)))
    else {
        return Html(ui::hello_page()).into_response();
    };

    if query.sync.as_deref() == Some("true") {
        return Html(ui::sync_confirm_page(assistant_type, profile)).into_response();
    }

    // Sessions start with the first message.
    let Some(session) = state
        .existing_session(assistant_type, query.session.as_deref())
        .await
    else {
        return Html(ui::chat_page(&ChatView {
            assistant_type,
            profile,
            session_id: None,
            messages: &[],
            last_error: None,
        }))
        .into_response();
    };
    let session = session.lock().await;

    Html(ui::chat_page(&ChatView {
        assistant_type,
        profile,
        session_id: Some(session.id()),
        messages: session.transcript.messages(),
        last_error: session.last_error.as_deref(),
    }))
    .into_response()
}

/// Chat form fields.
#[derive(Debug, Deserialize)]
pub struct ChatForm {
    pub assistant_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// POST /chat - run one turn, then show the session again.
pub async fn submit_chat(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Response {
    let Some(profile) = state.profile(&form.assistant_type) else {
        return Redirect::to("/").into_response();
    };

    let session = state
        .session_for(&form.assistant_type, profile, form.session_id.as_deref())
        .await;
    let mut session = session.lock().await;

    // Failures are kept in `last_error` and rendered by the page.
    let _ = state.relay.send(&mut session, &form.message).await;

    Redirect::to(&ui::page_url(&form.assistant_type, Some(session.id()))).into_response()
}

/// Feedback form fields.
#[derive(Debug, Deserialize)]
pub struct FeedbackForm {
    pub assistant_type: String,
    pub session_id: String,
    pub message_index: usize,
    pub score: Score,
    #[serde(default)]
    pub text: Option<String>,
}

/// POST /feedback - record thumbs feedback, then show the session again.
pub async fn submit_feedback(State(state): State<AppState>, Form(form): Form<FeedbackForm>) -> Response {
    let Some(session) = state
        .existing_session(&form.assistant_type, Some(&form.session_id))
        .await
    else {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };

    let feedback = Feedback {
        message_index: form.message_index,
        score: form.score,
        text: form.text,
    };
    let session = session.lock().await;
    if let Err(e) = feedback::record(&session, &feedback) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    Redirect::to(&ui::page_url(&form.assistant_type, Some(session.id()))).into_response()
}

/// POST /assistants/{type}/sync - run knowledge sync and show the report.
pub async fn run_sync(State(state): State<AppState>, Path(assistant_type): Path<String>) -> Response {
    let Some(profile) = state.profile(&assistant_type) else {
        return (StatusCode::NOT_FOUND, Html(ui::hello_page())).into_response();
    };

    let result = state.knowledge.run(profile).await;
    Html(ui::sync_report_page(&assistant_type, profile, &result)).into_response()
}
