//! HTML sanitization for user-authored rich text.
//!
//! Pure function over an allowlist: a fixed set of structural and formatting
//! tags, a narrow per-tag attribute set, and http/https/mailto URLs only.
//! Script and style content is removed entirely, so the output is safe to
//! render and sanitizing it again is a no-op.

use std::collections::{HashMap, HashSet};

use ammonia::Builder;

/// Structural and formatting tags allowed in rich text content
const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "strong", "b", "em", "i", "u", "s", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol",
    "li", "a", "img", "blockquote", "pre", "code", "table", "thead", "tbody", "tr", "th", "td",
    "div", "span", "hr",
];

/// Attributes allowed on links
const LINK_ATTRIBUTES: &[&str] = &["href", "title", "target", "rel"];

/// Attributes allowed on images
const IMAGE_ATTRIBUTES: &[&str] = &["src", "alt", "title", "width", "height"];

/// Attributes allowed on every tag
const GENERIC_ATTRIBUTES: &[&str] = &["class", "id"];

/// URL schemes allowed in href/src attributes
const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Sanitize user-authored HTML so it is safe to render.
///
/// Deterministic and idempotent: sanitizing already-sanitized output yields
/// the same output.
pub fn sanitize_html(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let tags: HashSet<&str> = ALLOWED_TAGS.iter().copied().collect();

    let mut tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
    tag_attributes.insert("a", LINK_ATTRIBUTES.iter().copied().collect());
    tag_attributes.insert("img", IMAGE_ATTRIBUTES.iter().copied().collect());

    Builder::default()
        .tags(tags)
        .tag_attributes(tag_attributes)
        .generic_attributes(GENERIC_ATTRIBUTES.iter().copied().collect())
        .url_schemes(ALLOWED_URL_SCHEMES.iter().copied().collect())
        // rel is managed through the attribute allowlist above
        .link_rel(None)
        .strip_comments(true)
        .clean(input)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_tag_removed_with_content() {
        let cleaned = sanitize_html("<script>alert(1)</script>hello");
        assert!(!cleaned.contains("<script"));
        assert!(!cleaned.contains("alert"));
        assert!(cleaned.contains("hello"));
    }

    #[test]
    fn test_style_content_removed() {
        let cleaned = sanitize_html("<style>body { display: none }</style><p>text</p>");
        assert!(!cleaned.contains("display"));
        assert!(cleaned.contains("<p>text</p>"));
    }

    #[test]
    fn test_event_handlers_stripped() {
        let cleaned = sanitize_html(r#"<p onclick="steal()">ok</p>"#);
        assert!(!cleaned.contains("onclick"));
        assert!(cleaned.contains("<p>ok</p>"));
    }

    #[test]
    fn test_javascript_urls_stripped() {
        let cleaned = sanitize_html(r#"<a href="javascript:alert(1)">link</a>"#);
        assert!(!cleaned.contains("javascript"));
        assert!(cleaned.contains("link"));

        let cleaned = sanitize_html(r#"<img src="data:text/html;base64,PHNjcmlwdD4=">"#);
        assert!(!cleaned.contains("data:"));
    }

    #[test]
    fn test_safe_markup_preserved() {
        let input = concat!(
            r#"<h2 id="intro">Intro</h2>"#,
            r#"<p class="lead">Hello <strong>world</strong></p>"#,
            r#"<a href="https://example.com" title="Example" target="_blank" rel="noopener">x</a>"#,
            r#"<img src="http://example.com/a.png" alt="a" width="10" height="10">"#,
        );
        let cleaned = sanitize_html(input);
        assert!(cleaned.contains(r#"<h2 id="intro">"#));
        assert!(cleaned.contains(r#"class="lead""#));
        assert!(cleaned.contains(r#"href="https://example.com""#));
        assert!(cleaned.contains(r#"src="http://example.com/a.png""#));
        assert!(cleaned.contains("<strong>world</strong>"));
    }

    #[test]
    fn test_mailto_links_allowed() {
        let cleaned = sanitize_html(r#"<a href="mailto:team@example.com">mail</a>"#);
        assert!(cleaned.contains("mailto:team@example.com"));
    }

    #[test]
    fn test_unknown_tags_stripped_but_text_kept() {
        let cleaned = sanitize_html("<iframe src=\"https://evil.example\"></iframe><em>ok</em>");
        assert!(!cleaned.contains("iframe"));
        assert!(cleaned.contains("<em>ok</em>"));
    }

    #[test]
    fn test_comments_stripped() {
        let cleaned = sanitize_html("<p>a</p><!-- hidden -->");
        assert!(!cleaned.contains("hidden"));
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "<script>alert(1)</script>hello",
            r#"<p onclick="x" class="c">text <a href="javascript:x">l</a></p>"#,
            "plain text & ampersand <not-a-tag>",
            r#"<table><thead><tr><th>h</th></tr></thead><tbody><tr><td>d</td></tr></tbody></table>"#,
        ];
        for input in inputs {
            let once = sanitize_html(input);
            let twice = sanitize_html(&once);
            assert_eq!(once, twice, "sanitize must be idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize_html(""), "");
    }
}
