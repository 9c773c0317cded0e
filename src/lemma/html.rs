//! Markup removal for bodies that are not parsed as HTML documents

use regex::Regex;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern is valid"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Removes HTML comments and tags and trims the result
///
/// Entities are left as-is.
pub fn strip_html(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let without_comments = COMMENT.replace_all(html, "");
    TAG.replace_all(&without_comments, "").trim().to_string()
}
