//! Text helpers for post content
//!
//! Slugs, plain-text extraction, excerpts and HTML sanitizing. Post bodies
//! come from a rich text editor as HTML and are cleaned against a tag and
//! attribute allowlist with ammonia before they are stored.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default excerpt length in characters
pub const EXCERPT_LENGTH: usize = 160;

static ACTIVE_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|object|embed|noscript)\b[^>]*>.*?</(script|style|iframe|object|embed|noscript)\s*>")
        .expect("valid regex")
});

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Generate a URL-friendly slug from a title.
///
/// Lowercases, keeps letters and digits (including non-ASCII letters),
/// turns everything else into single hyphens and trims hyphens at both ends.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut prev_hyphen = true;

    for c in title.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen {
            slug.push('-');
            prev_hyphen = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}

/// Keep only allowlisted tags, attributes and URL schemes of editor HTML
pub fn sanitize_html(html: &str) -> String {
    ammonia::Builder::default()
        .add_generic_attributes(["class"])
        .clean(html)
        .to_string()
}

/// Plain text of an HTML fragment with whitespace collapsed
pub fn strip_html(html: &str) -> String {
    let without_blocks = ACTIVE_BLOCKS.replace_all(html, " ");
    let text = TAGS.replace_all(&without_blocks, " ");
    let text = decode_entities(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Excerpt of at most `max_chars` characters, cut on a word boundary
pub fn make_excerpt(html: &str, max_chars: usize) -> String {
    let text = strip_html(html);
    if text.chars().count() <= max_chars {
        return text;
    }

    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(' ') {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end_matches(|c: char| c.is_ascii_punctuation()))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Rust: 2024 edition!  "), "rust-2024-edition");
        assert_eq!(generate_slug("a__b--c"), "a-b-c");
        assert_eq!(generate_slug("Café au lait"), "café-au-lait");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_sanitize_removes_scripts_and_handlers() {
        let html = r#"<p onclick="steal()">Hi<script>alert(1)</script></p><a href="javascript:alert(1)">x</a><iframe src="//evil"></iframe>"#;
        let clean = sanitize_html(html);
        assert!(!clean.contains("script"));
        assert!(!clean.contains("onclick"));
        assert!(!clean.contains("javascript:"));
        assert!(!clean.contains("iframe"));
        assert!(clean.contains("<p>Hi</p>"));
        assert!(!clean.contains("href"));
    }

    #[test]
    fn test_sanitize_handles_obfuscated_vectors() {
        let vectors = [
            "<img/onerror=alert(1) src=x>",
            "<svg/onload=alert(1)>",
            r#"<a href="&#106;avascript:alert(1)">x</a>"#,
            "<a href=\"java\tscript:alert(1)\">x</a>",
            r#"<a href="data:text/html,<script>alert(1)</script>">x</a>"#,
            r#"<p style="background:url(javascript:alert(1))">x</p>"#,
        ];
        for vector in vectors {
            let clean = sanitize_html(vector).to_lowercase();
            assert!(!clean.contains("onerror"), "{vector} -> {clean}");
            assert!(!clean.contains("onload"), "{vector} -> {clean}");
            assert!(!clean.contains("script:"), "{vector} -> {clean}");
            assert!(!clean.contains("&#106;"), "{vector} -> {clean}");
            assert!(!clean.contains("<svg"), "{vector} -> {clean}");
            assert!(!clean.contains("style="), "{vector} -> {clean}");
            assert!(!clean.contains("data:"), "{vector} -> {clean}");
        }
    }

    #[test]
    fn test_sanitize_keeps_regular_markup() {
        let html = r#"<h2>Title</h2><p class="lead">Some <strong>bold</strong> and <a href="https://example.com">link</a></p><img src="https://ik.imagekit.io/x.png" alt="x">"#;
        let clean = sanitize_html(html);
        assert!(clean.starts_with(r#"<h2>Title</h2><p class="lead">Some <strong>bold</strong> and <a href="https://example.com""#));
        assert!(clean.contains(">link</a></p>"));
        assert!(clean.contains(r#"<img src="https://ik.imagekit.io/x.png" alt="x">"#));
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>Hello&nbsp;<b>world</b></p>\n<p>Fish &amp; chips</p><style>p{}</style>"),
            "Hello world Fish & chips"
        );
    }

    #[test]
    fn test_make_excerpt() {
        assert_eq!(make_excerpt("<p>Short</p>", 160), "Short");
        let long = format!("<p>{}</p>", "word ".repeat(100));
        let excerpt = make_excerpt(&long, 20);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 23);
        assert!(!excerpt.contains("<p>"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn slug_is_url_safe(title in "\\PC{0,80}") {
            let slug = generate_slug(&title);
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c == '-' || c.is_alphanumeric()));
        }

        #[test]
        fn excerpt_never_exceeds_limit(text in "[a-z ]{0,400}", max in 5usize..200) {
            let excerpt = make_excerpt(&text, max);
            prop_assert!(excerpt.chars().count() <= max + 3);
        }
    }
}
