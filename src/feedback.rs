//! Thumbs feedback on assistant replies.
//!
//! Feedback is recorded as a structured `chat.feedback` log event and is not
//! stored anywhere else.

use serde::{Deserialize, Serialize};

use crate::error::FeedbackError;
use crate::session::{ChatSession, Role};

/// Thumbs up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    #[serde(rename = "👍", alias = "up")]
    ThumbsUp,
    #[serde(rename = "👎", alias = "down")]
    ThumbsDown,
}

impl Score {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThumbsUp => "👍",
            Self::ThumbsDown => "👎",
        }
    }
}

/// Feedback on one message of a session's transcript.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Feedback {
    /// Zero-based transcript position of the rated reply.
    pub message_index: usize,
    pub score: Score,
    /// Optional explanation. Blank text is treated as absent.
    #[serde(default)]
    pub text: Option<String>,
}

impl Feedback {
    fn comment(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Validate feedback against the session transcript and log it.
pub fn record(session: &ChatSession, feedback: &Feedback) -> Result<(), FeedbackError> {
    let index = feedback.message_index;
    let message = session
        .transcript
        .get(index)
        .ok_or(FeedbackError::NoSuchMessage(index))?;
    if message.role() != Role::Assistant {
        return Err(FeedbackError::NotAssistant(index));
    }

    tracing::info!(
        name: "chat.feedback",
        session_id = %session.id(),
        assistant_type = %session.assistant_type(),
        message_index = index,
        score = feedback.score.as_str(),
        text = feedback.comment().unwrap_or_default(),
        "Feedback received"
    );
    Ok(())
}
