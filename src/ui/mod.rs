//! Server-rendered HTML.
//!
//! Pages are plain HTML with ordinary forms; no client script is needed to
//! chat. Every piece of user or assistant text goes through [`escape`] or
//! [`markdown::render`] before it reaches a page.
//!
//! - [`chat`]: assistant page with transcript and input
//! - [`markdown`]: transcript rendering
//! - [`sync`]: knowledge sync confirmation and report

pub mod chat;
pub mod markdown;
pub mod sync;

pub use chat::{ChatView, chat_page, hello_page};
pub use sync::{sync_confirm_page, sync_report_page};

/// Placeholder of the chat input.
pub const INPUT_PLACEHOLDER: &str = "请输入您的问题...";

/// Escape text for use in element content and quoted attribute values.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail.
    let _ = pulldown_cmark_escape::escape_html(&mut out, text);
    out
}

/// Query string for an assistant page, optionally bound to a session.
#[must_use]
pub fn page_url(assistant_type: &str, session_id: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("type", assistant_type);
    if let Some(id) = session_id {
        query.append_pair("session", id);
    }
    format!("/?{}", query.finish())
}

/// Generate the HTML shell for a page.
#[must_use]
pub fn html_shell(title: &str, content: &str) -> String {
    let title = escape(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="zh">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; margin: 0; background: #f7f7f8; color: #1f2328; }}
        main {{ max-width: 48rem; margin: 0 auto; padding: 1.5rem 1rem 6rem; }}
        .caption {{ color: #6e7781; margin-top: -0.5rem; }}
        .message {{ display: flex; gap: 0.75rem; margin: 1rem 0; }}
        .avatar {{ font-size: 1.5rem; line-height: 1; }}
        .bubble {{ background: #fff; border-radius: 0.75rem; padding: 0.25rem 1rem; flex: 1; overflow-x: auto; }}
        .message-user .bubble {{ background: #e8f0fe; }}
        .message-error .bubble {{ background: #ffebe9; color: #82071e; }}
        .feedback {{ display: flex; gap: 0.5rem; margin: 0.25rem 0 0 2.25rem; }}
        .feedback input[type=text] {{ flex: 1; }}
        .chat-input {{ position: fixed; bottom: 0; left: 0; right: 0; background: #fff; padding: 1rem; }}
        .chat-input form {{ display: flex; gap: 0.5rem; max-width: 48rem; margin: 0 auto; }}
        .chat-input input[name=message] {{ flex: 1; padding: 0.6rem; }}
        pre {{ background: #f6f8fa; padding: 0.75rem; overflow-x: auto; }}
    </style>
</head>
<body>
    <main id="app">
        {content}
    </main>
</body>
</html>"#
    )
}
