//! JSON API handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::feedback::{self, Feedback};
use crate::session::Message;

/// Error body returned with every non-success status.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Status plus JSON error body.
pub type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Request body for chat API.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Assistant profile key.
    pub assistant_type: String,
    /// Optional session ID (creates new if not provided).
    #[serde(default)]
    pub session_id: Option<String>,
    /// User message content.
    pub message: String,
}

/// Response from chat API.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
}

/// POST /api/chat - run one turn and return the reply.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Some(profile) = state.profile(&req.assistant_type) else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown assistant type '{}'", req.assistant_type),
        ));
    };
    if req.message.trim().is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Message cannot be empty",
        ));
    }

    let session = match req.session_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => state
            .existing_session(&req.assistant_type, Some(id))
            .await
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found"))?,
        None => state.sessions.create(&req.assistant_type, &profile.id),
    };
    let mut session = session.lock().await;

    match state.relay.send(&mut session, &req.message).await {
        Ok(Some(reply)) => Ok(Json(ChatResponse {
            session_id: session.id().to_string(),
            reply,
        })),
        Ok(None) => Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Message cannot be empty",
        )),
        Err(e) => Err(api_error(StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

/// GET /api/sessions/{id}/messages - transcript of a session.
pub async fn messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found"))?;
    let session = session.lock().await;
    Ok(Json(session.transcript.messages().to_vec()))
}

/// DELETE /api/sessions/{id} - end a session.
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => {
            tracing::info!(name: "session.deleted", session_id = %id, "Session deleted");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Request body for feedback API.
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub feedback: Feedback,
}

/// POST /api/feedback - record thumbs feedback on an assistant reply.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .sessions
        .get(&req.session_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found"))?;
    let session = session.lock().await;

    feedback::record(&session, &req.feedback)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
