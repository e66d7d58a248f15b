//! Credential redaction (spec.md §4.3, §8 property 8), applied to HTML
//! response bodies before they reach the wire.

use regex::Regex;
use std::sync::LazyLock;

static PASSWORD_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<input\b[^>]*\btype\s*=\s*["']?password["']?[^>]*\bvalue\s*=\s*["']([^"']*)["'][^>]*>"#)
        .expect("static pattern")
});

static VALUE_ATTR_GENERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<input\b(?:(?!>).)*\bdata-sensitive(?:(?!>).)*\bvalue\s*=\s*["']([^"']*)["'](?:(?!>).)*>"#)
        .expect("static pattern")
});

static SENSITIVE_DATA_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)\bdata-(password|secret|token|api-key|credential|auth)\s*=\s*["']([^"']*)["']"#,
    )
    .expect("static pattern")
});

static BEARER_JWT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Bearer\s+[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+"#).expect("static pattern")
});

const REDACTED: &str = "[REDACTED]";

/// Redact known-sensitive values from an HTML document. Idempotent and safe
/// to call on content that contains none of the patterns.
pub fn redact_html(html: &str) -> String {
    let mut out = html.to_string();

    out = replace_captured_value(&PASSWORD_INPUT, &out);
    out = replace_captured_value(&VALUE_ATTR_GENERIC, &out);

    out = SENSITIVE_DATA_ATTR
        .replace_all(&out, |caps: &regex::Captures| {
            format!("data-{}=\"{}\"", &caps[1], REDACTED)
        })
        .into_owned();

    out = BEARER_JWT.replace_all(&out, format!("Bearer {REDACTED}")).into_owned();

    out
}

fn replace_captured_value(re: &Regex, input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let whole = caps.get(0).expect("match 0 always present");
        let value = caps.get(1).expect("capture group 1 present");
        result.push_str(&input[last..value.start()]);
        result.push_str(REDACTED);
        result.push_str(&input[value.end()..whole.end()]);
        last = whole.end();
    }
    result.push_str(&input[last..]);
    result
}

/// Whether a single element, given its tag/type/attributes, is a sensitive
/// value surface per spec.md §4.3 ("observe/element with property value").
pub fn is_sensitive_element(tag_name: &str, input_type: Option<&str>, has_data_sensitive: bool) -> bool {
    has_data_sensitive || (tag_name.eq_ignore_ascii_case("input") && input_type == Some("password"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_password_input_value() {
        let html = r#"<input type="password" name="pw" value="hunter2">"#;
        let redacted = redact_html(html);
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains(REDACTED));
    }

    #[test]
    fn redacts_data_sensitive_attribute_values() {
        let html = r#"<div data-token="abc123">x</div>"#;
        let redacted = redact_html(html);
        assert!(!redacted.contains("abc123"));
    }

    #[test]
    fn redacts_bearer_jwt() {
        let html = "Authorization: Bearer aaa.bbb.ccc";
        let redacted = redact_html(html);
        assert!(!redacted.contains("aaa.bbb.ccc"));
    }

    #[test]
    fn leaves_ordinary_html_untouched() {
        let html = "<p>Hello, world</p>";
        assert_eq!(redact_html(html), html);
    }

    #[test]
    fn sensitive_element_detection() {
        assert!(is_sensitive_element("input", Some("password"), false));
        assert!(is_sensitive_element("input", Some("text"), true));
        assert!(!is_sensitive_element("input", Some("text"), false));
    }
}
