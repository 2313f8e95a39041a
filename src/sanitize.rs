//! Cleanup for scraped strings before they are written anywhere a browser
//! might render them.

use scraper::{Html, Node};

use crate::models::MAX_URL_LENGTH;

pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const DEFAULT_MAX_LENGTH: usize = 500;

const DANGEROUS_SCHEMES: [&str; 6] = ["javascript:", "data:", "vbscript:", "file:", "about:", "blob:"];
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Strips every tag (dropping script and style bodies), decodes entities,
/// collapses whitespace and cuts to `max_len` characters with a trailing "...".
pub fn sanitize_text(text: &str, max_len: usize) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(text);
    let mut visible = String::with_capacity(text.len());
    for node in fragment.root_element().descendants() {
        let Node::Text(content) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
            Node::Element(element) => HIDDEN_ELEMENTS.contains(&element.name()),
            _ => false,
        });
        if !hidden {
            visible.push_str(content);
        }
    }

    let collapsed = visible.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_len {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_len.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// Accepts only http(s) URLs of sane length; anything else yields `None`.
pub fn sanitize_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() || url.chars().count() > MAX_URL_LENGTH {
        return None;
    }
    let lowered = url.to_lowercase();
    if DANGEROUS_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }
    if !(lowered.starts_with("http://") || lowered.starts_with("https://")) {
        return None;
    }
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_script_bodies() {
        assert_eq!(
            sanitize_text("<script>alert('xss')</script>Hello", DEFAULT_MAX_LENGTH),
            "Hello"
        );
        assert_eq!(
            sanitize_text("<p>Rock &amp; <b>Roll</b></p>\n\n  tonight", DEFAULT_MAX_LENGTH),
            "Rock & Roll tonight"
        );
        assert_eq!(sanitize_text("   ", DEFAULT_MAX_LENGTH), "");
    }

    #[test]
    fn truncates_with_ellipsis() {
        let long = "A".repeat(1000);
        let cut = sanitize_text(&long, 100);
        assert_eq!(cut.chars().count(), 100);
        assert!(cut.ends_with("..."));
        assert_eq!(sanitize_text("Kurz", 100), "Kurz");
    }

    #[test]
    fn rejects_dangerous_urls() {
        assert_eq!(
            sanitize_url(" https://example.com/event "),
            Some("https://example.com/event".to_string())
        );
        assert_eq!(sanitize_url("HTTP://EXAMPLE.COM"), Some("HTTP://EXAMPLE.COM".to_string()));
        assert_eq!(sanitize_url("javascript:alert('xss')"), None);
        assert_eq!(sanitize_url("data:text/html,<script>"), None);
        assert_eq!(sanitize_url("ftp://example.com"), None);
        assert_eq!(sanitize_url(""), None);
        let too_long = format!("https://example.com/{}", "a".repeat(500));
        assert_eq!(sanitize_url(&too_long), None);
    }
}
