//! Assistant chat page.

use std::fmt::Write;

use super::{INPUT_PLACEHOLDER, escape, html_shell, markdown};
use crate::config::AssistantProfile;
use crate::feedback::Score;
use crate::session::{Message, Role};

/// Everything the chat page shows.
#[derive(Debug, Clone, Copy)]
pub struct ChatView<'a> {
    pub assistant_type: &'a str,
    pub profile: &'a AssistantProfile,
    /// Absent until the first message starts a session.
    pub session_id: Option<&'a str>,
    pub messages: &'a [Message],
    /// Error of the last turn, shown after the transcript.
    pub last_error: Option<&'a str>,
}

/// Render the chat page for one session.
#[must_use]
pub fn chat_page(view: &ChatView<'_>) -> String {
    let profile = view.profile;
    let heading = format!("{} {}", profile.icon, profile.title);
    let heading = heading.trim();

    let mut content = String::new();
    let _ = write!(
        content,
        r#"<header>
            <h1>{}</h1>
            <p class="caption">{}</p>
        </header>
        <section id="transcript" aria-live="polite">"#,
        escape(heading),
        escape(&profile.description),
    );

    for (index, message) in view.messages.iter().enumerate() {
        content.push_str(&message_html(message));
        if message.role() == Role::Assistant {
            content.push_str(&feedback_form(view, index));
        }
    }

    if let Some(error) = view.last_error {
        let _ = write!(
            content,
            r#"<div class="message message-error" role="alert">
                <div class="avatar">⚠️</div>
                <div class="bubble">{}</div>
            </div>"#,
            markdown::render_plain(error)
        );
    }

    let session_field = view.session_id.map_or_else(String::new, |id| {
        format!(r#"<input type="hidden" name="session_id" value="{}">"#, escape(id))
    });
    let _ = write!(
        content,
        r#"</section>
        <div class="chat-input">
            <form method="post" action="/chat">
                <input type="hidden" name="assistant_type" value="{assistant_type}">
                {session_field}
                <input type="text" name="message" placeholder="{INPUT_PLACEHOLDER}" autocomplete="off" autofocus>
                <button type="submit">发送</button>
            </form>
        </div>"#,
        assistant_type = escape(view.assistant_type),
    );

    html_shell(heading, &content)
}

fn message_html(message: &Message) -> String {
    let (class, avatar) = match message.role() {
        Role::User => ("message-user", "🧑"),
        Role::Assistant => ("message-assistant", "🤖"),
    };
    format!(
        r#"<div class="message {class}">
            <div class="avatar">{avatar}</div>
            <div class="bubble">{}</div>
        </div>"#,
        markdown::render(message.content())
    )
}

fn feedback_form(view: &ChatView<'_>, index: usize) -> String {
    format!(
        r#"<form class="feedback" method="post" action="/feedback">
            <input type="hidden" name="assistant_type" value="{assistant_type}">
            <input type="hidden" name="session_id" value="{session_id}">
            <input type="hidden" name="message_index" value="{index}">
            <input type="text" name="text" placeholder="[可选] 请解释" aria-label="Feedback">
            <button type="submit" name="score" value="{up}">{up}</button>
            <button type="submit" name="score" value="{down}">{down}</button>
        </form>"#,
        assistant_type = escape(view.assistant_type),
        session_id = escape(view.session_id.unwrap_or_default()),
        up = Score::ThumbsUp.as_str(),
        down = Score::ThumbsDown.as_str(),
    )
}

/// Page shown when no known assistant is selected.
#[must_use]
pub fn hello_page() -> String {
    html_shell("Hello", "<h1>Hello</h1>")
}
