//! HTML sanitizing for inbound bodies

/// Strip active content from an HTML body.
///
/// Scripts, styles, forms, frames and embedded objects are removed with
/// their content; event handler attributes and non-http(s)/mailto URLs are
/// dropped.
pub fn sanitize_html(html: &str) -> String {
    let mut builder = ammonia::Builder::default();
    builder.add_clean_content_tags(["form", "iframe", "object", "embed", "noscript"]);
    builder.add_generic_attributes(["style"]);
    builder.add_tag_attributes("font", ["color", "face", "size"]);
    builder.add_tags(["font", "center"]);
    builder.clean(html).to_string()
}

/// Plain-text rendering of an HTML body
pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 78).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_script_removed_with_content() {
        assert_eq!(sanitize_html("<p>Hi</p><script>alert(1)</script>"), "<p>Hi</p>");
    }

    #[test]
    fn test_event_handlers_and_javascript_urls_removed() {
        let cleaned = sanitize_html(
            r#"<p onclick="steal()">Exposé</p><a href="javascript:alert(1)">Link</a>"#,
        );
        assert!(!cleaned.contains("onclick"));
        assert!(!cleaned.contains("javascript:"));
        assert!(cleaned.contains("Exposé"));
    }

    #[test]
    fn test_forms_and_iframes_removed() {
        let cleaned = sanitize_html(
            r#"<p>Text</p><form action="https://evil.example"><input name="pw"></form><iframe src="https://evil.example">x</iframe>"#,
        );
        assert_eq!(cleaned, "<p>Text</p>");
    }

    #[test]
    fn test_regular_markup_kept() {
        let html = r#"<p>Guten Tag,<br>die <strong>Wohnung</strong> ist frei.</p>"#;
        assert_eq!(sanitize_html(html), html);
    }

    #[test]
    fn test_html_to_text() {
        let text = html_to_text("<p>Guten Tag</p><p>Zweiter Absatz</p>");
        assert!(text.contains("Guten Tag"));
        assert!(text.contains("Zweiter Absatz"));
        assert!(!text.contains('<'));
    }
}
