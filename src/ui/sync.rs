//! Knowledge sync pages.

use std::fmt::Write;

use super::{escape, html_shell, page_url};
use crate::config::AssistantProfile;
use crate::error::SyncError;
use crate::knowledge::SyncReport;

/// Confirmation page with the form that starts a sync.
#[must_use]
pub fn sync_confirm_page(assistant_type: &str, profile: &AssistantProfile) -> String {
    let source = profile
        .llm_txt_url
        .as_deref()
        .map_or_else(|| "<em>not configured</em>".to_string(), escape);

    let content = format!(
        r#"<h1>同步知识库: {title}</h1>
        <p>Assistant <code>{id}</code> will have its file search documents replaced with the files listed in {source}.</p>
        <form method="post" action="/assistants/{action}/sync">
            <button type="submit">开始同步</button>
        </form>
        <p><a href="{back}">返回</a></p>"#,
        title = escape(&profile.title),
        id = escape(&profile.id),
        action = url::form_urlencoded::byte_serialize(assistant_type.as_bytes()).collect::<String>(),
        back = escape(&page_url(assistant_type, None)),
    );
    html_shell(&format!("Sync {}", profile.title), &content)
}

/// Outcome of a sync run.
#[must_use]
pub fn sync_report_page(
    assistant_type: &str,
    profile: &AssistantProfile,
    result: &Result<SyncReport, SyncError>,
) -> String {
    let mut content = format!("<h1>同步知识库: {}</h1>", escape(&profile.title));

    match result {
        Ok(report) => {
            let _ = write!(
                content,
                "<p>Downloaded {} documents from {}.</p><ul>",
                report.documents.len(),
                escape(&report.source)
            );
            for name in &report.documents {
                let _ = write!(content, "<li>{}</li>", escape(name));
            }
            let _ = write!(
                content,
                "</ul>
                <p>Removed {removed} of {total} previous files.</p>
                <p>Uploaded {uploaded} of {files} files to vector store <code>{store}</code> in {attempts} attempt(s).</p>
                <p class=\"status\">同步完成</p>",
                removed = report.cleared.removed,
                total = report.cleared.total,
                uploaded = report.uploaded.uploaded,
                files = report.uploaded.total,
                store = escape(&report.uploaded.vector_store_id),
                attempts = report.uploaded.attempts,
            );
        }
        Err(e) => {
            let _ = write!(
                content,
                r#"<div class="message message-error" role="alert"><div class="bubble"><p>同步失败: {}</p></div></div>"#,
                escape(&e.to_string())
            );
        }
    }

    let _ = write!(
        content,
        r#"<p><a href="{}">返回</a></p>"#,
        escape(&page_url(assistant_type, None))
    );
    html_shell(&format!("Sync {}", profile.title), &content)
}
