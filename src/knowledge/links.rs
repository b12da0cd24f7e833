//! Markdown link extraction and safe file naming.

use std::sync::LazyLock;

use regex::Regex;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link pattern"));

static INVALID_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid filename pattern"));

const MAX_FILENAME_CHARS: usize = 100;

/// A `[text](url)` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink {
    pub text: String,
    pub url: String,
}

/// All links to `.md` documents, in document order.
#[must_use]
pub fn extract_markdown_links(content: &str) -> Vec<MarkdownLink> {
    LINK_RE
        .captures_iter(content)
        .filter(|c| c[2].ends_with(".md"))
        .map(|c| MarkdownLink {
            text: c[1].to_string(),
            url: c[2].to_string(),
        })
        .collect()
}

/// Turn link text into a portable file stem.
///
/// Reserved characters become `_`, leading and trailing dots and spaces are
/// dropped, and names over 100 characters keep 97 plus `...`.
#[must_use]
pub fn clean_filename(text: &str) -> String {
    let replaced = INVALID_FILENAME_RE.replace_all(text, "_");
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');

    if trimmed.chars().count() > MAX_FILENAME_CHARS {
        let mut short: String = trimmed.chars().take(MAX_FILENAME_CHARS - 3).collect();
        short.push_str("...");
        short
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_only_markdown_targets() {
        let index = "# Docs\n\
            - [Getting started](https://example.com/start.md): intro\n\
            - [API](https://example.com/api.html)\n\
            - [Guide: setup](https://example.com/guide/setup.md)";

        assert_eq!(
            extract_markdown_links(index),
            vec![
                MarkdownLink {
                    text: "Getting started".to_string(),
                    url: "https://example.com/start.md".to_string(),
                },
                MarkdownLink {
                    text: "Guide: setup".to_string(),
                    url: "https://example.com/guide/setup.md".to_string(),
                },
            ]
        );
    }

    #[test]
    fn ignores_links_with_empty_text() {
        assert!(extract_markdown_links("[](https://example.com/a.md)").is_empty());
    }

    #[test]
    fn replaces_reserved_characters() {
        assert_eq!(clean_filename("Guide: a/b?"), "Guide_ a_b_");
        assert_eq!(clean_filename("tab\there"), "tab_here");
    }

    #[test]
    fn trims_dots_and_spaces() {
        assert_eq!(clean_filename(" ..hidden name.. "), "hidden name");
    }

    #[test]
    fn truncates_long_names() {
        let long = "x".repeat(150);
        let cleaned = clean_filename(&long);
        assert_eq!(cleaned.chars().count(), 100);
        assert!(cleaned.ends_with("..."));

        let exact = "y".repeat(100);
        assert_eq!(clean_filename(&exact), exact);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let name = "文".repeat(100);
        assert_eq!(clean_filename(&name), name);
    }
}
