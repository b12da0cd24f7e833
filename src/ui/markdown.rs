//! Markdown to HTML for transcript messages.

use pulldown_cmark::{CowStr, Event, Options, Parser, html};

/// Render markdown to HTML. Raw HTML in the source is shown as text.
#[must_use]
pub fn render(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Render text verbatim as a paragraph, with no markdown interpretation.
#[must_use]
pub fn render_plain(text: &str) -> String {
    let mut out = String::from("<p>");
    html::push_html(&mut out, std::iter::once(Event::Text(CowStr::Borrowed(text))));
    out.push_str("</p>");
    out
}
