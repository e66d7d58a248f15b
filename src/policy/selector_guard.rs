//! Selector guard (spec.md §4.3): rejects empty/oversized selector values
//! and obvious injection patterns in CSS/XPath.

use crate::error::BapError;
use crate::selector::Selector;

const MAX_SELECTOR_LEN: usize = 10_000;

pub fn validate_selector_value(sel: &Selector) -> Result<(), BapError> {
    let value = match sel {
        Selector::Css { value }
        | Selector::Xpath { value }
        | Selector::Text { value, .. }
        | Selector::Label { value }
        | Selector::Placeholder { value }
        | Selector::TestId { value } => value,
        _ => return Ok(()),
    };

    if value.trim().is_empty() {
        return Err(BapError::invalid_params("Selector value must not be empty or whitespace"));
    }
    if value.len() > MAX_SELECTOR_LEN {
        return Err(BapError::invalid_params(format!(
            "Selector value exceeds {MAX_SELECTOR_LEN} characters"
        )));
    }

    if let Selector::Css { value } = sel {
        let lower = value.to_ascii_lowercase();
        if lower.contains("javascript:") && lower.contains("url(") || lower.contains("expression(") {
            return Err(BapError::invalid_params("Selector contains a disallowed CSS pattern")
                .with_details(serde_json::json!({ "reason": "css-injection" })));
        }
    }

    if let Selector::Xpath { value } = sel {
        if value.to_ascii_lowercase().contains("document(") {
            return Err(BapError::invalid_params("Selector contains a disallowed XPath function")
                .with_details(serde_json::json!({ "reason": "xpath-injection" })));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_value() {
        assert!(validate_selector_value(&Selector::Css { value: "   ".into() }).is_err());
    }

    #[test]
    fn rejects_oversized_value() {
        let value = "a".repeat(MAX_SELECTOR_LEN + 1);
        assert!(validate_selector_value(&Selector::Css { value }).is_err());
    }

    #[test]
    fn rejects_css_url_javascript_injection() {
        let sel = Selector::Css {
            value: "div { background: url(javascript:alert(1)) }".into(),
        };
        assert!(validate_selector_value(&sel).is_err());
    }

    #[test]
    fn rejects_xpath_document_function() {
        let sel = Selector::Xpath {
            value: "document('http://evil')".into(),
        };
        assert!(validate_selector_value(&sel).is_err());
    }

    #[test]
    fn accepts_ordinary_css() {
        assert!(validate_selector_value(&Selector::Css { value: "#submit".into() }).is_ok());
    }
}
