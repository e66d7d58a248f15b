//! Selector variants and the string-form parser/formatter (spec.md §4.7).
//!
//! The teacher resolves elements with bare CSS strings passed straight to
//! `page.find_element()` (see `tools/click.rs`). BAP generalizes that single
//! variant into a closed, tagged union so higher-level callers (the
//! composite action engine, `agent/observe`) can reason about *how* an
//! element was found rather than just its final CSS string.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Selector {
    Css { value: String },
    Xpath { value: String },
    Role {
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        exact: bool,
    },
    Text {
        value: String,
        #[serde(default)]
        exact: bool,
    },
    Label { value: String },
    Placeholder { value: String },
    TestId { value: String },
    Coordinates { x: f64, y: f64 },
    Ref { ref_id: String },
    Semantic { description: String },
}

impl Selector {
    /// Human-readable description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Selector::Css { value } => format!("css:{value}"),
            Selector::Xpath { value } => format!("xpath:{value}"),
            Selector::Role { role, name, .. } => match name {
                Some(n) => format!("role:{role}:\"{n}\""),
                None => format!("role:{role}"),
            },
            Selector::Text { value, .. } => format!("text:\"{value}\""),
            Selector::Label { value } => format!("label:\"{value}\""),
            Selector::Placeholder { value } => format!("placeholder:\"{value}\""),
            Selector::TestId { value } => format!("testid:{value}"),
            Selector::Coordinates { x, y } => format!("coords:{x},{y}"),
            Selector::Ref { ref_id } => ref_id.clone(),
            Selector::Semantic { description } => format!("semantic:\"{description}\""),
        }
    }

    /// `semantic` selectors are reserved for future AI resolution; today
    /// they fall back to a plain text match (spec.md open question —
    /// explicitly not silently matching something else).
    pub fn resolved_for_engine(&self) -> Selector {
        match self {
            Selector::Semantic { description } => Selector::Text {
                value: description.clone(),
                exact: false,
            },
            other => other.clone(),
        }
    }
}

/// Canonical string forms, per spec.md §4.7:
/// `role:R:"Name"`, `text:"…"`, `label:"…"`, `placeholder:"…"`, `testid:…`,
/// `css:…`, `xpath:…`, `coords:X,Y`, `ref:@x` / `@x`, `e<N>`, bare `#id` /
/// `.class`.
pub fn format_selector(sel: &Selector) -> String {
    match sel {
        Selector::Css { value } => format!("css:{value}"),
        Selector::Xpath { value } => format!("xpath:{value}"),
        Selector::Role { role, name, .. } => match name {
            Some(n) => format!("role:{role}:\"{n}\""),
            None => format!("role:{role}"),
        },
        Selector::Text { value, .. } => format!("text:\"{value}\""),
        Selector::Label { value } => format!("label:\"{value}\""),
        Selector::Placeholder { value } => format!("placeholder:\"{value}\""),
        Selector::TestId { value } => format!("testid:{value}"),
        Selector::Coordinates { x, y } => format!("coords:{x},{y}"),
        Selector::Ref { ref_id } => format!("ref:{ref_id}"),
        Selector::Semantic { description } => format!("semantic:\"{description}\""),
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Parse one of the canonical string forms into a `Selector`.
pub fn parse_selector(input: &str) -> Result<Selector, String> {
    let s = input.trim();

    if let Some(rest) = s.strip_prefix("ref:") {
        return Ok(Selector::Ref { ref_id: rest.to_string() });
    }
    if s.starts_with('@') {
        return Ok(Selector::Ref { ref_id: s.to_string() });
    }
    if let Some(rest) = s.strip_prefix('e') {
        if rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty() {
            return Ok(Selector::Ref { ref_id: s.to_string() });
        }
    }
    if let Some(rest) = s.strip_prefix("css:") {
        return Ok(Selector::Css { value: rest.to_string() });
    }
    if let Some(rest) = s.strip_prefix("xpath:") {
        return Ok(Selector::Xpath { value: rest.to_string() });
    }
    if let Some(rest) = s.strip_prefix("testid:") {
        return Ok(Selector::TestId { value: rest.to_string() });
    }
    if let Some(rest) = s.strip_prefix("text:") {
        return Ok(Selector::Text {
            value: unquote(rest),
            exact: false,
        });
    }
    if let Some(rest) = s.strip_prefix("label:") {
        return Ok(Selector::Label { value: unquote(rest) });
    }
    if let Some(rest) = s.strip_prefix("placeholder:") {
        return Ok(Selector::Placeholder { value: unquote(rest) });
    }
    if let Some(rest) = s.strip_prefix("coords:") {
        let mut parts = rest.splitn(2, ',');
        let x = parts
            .next()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| format!("invalid coords selector: {s}"))?;
        let y = parts
            .next()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| format!("invalid coords selector: {s}"))?;
        return Ok(Selector::Coordinates { x, y });
    }
    if let Some(rest) = s.strip_prefix("semantic:") {
        return Ok(Selector::Semantic {
            description: unquote(rest),
        });
    }
    if let Some(rest) = s.strip_prefix("role:") {
        let mut parts = rest.splitn(2, ':');
        let role = parts
            .next()
            .ok_or_else(|| format!("invalid role selector: {s}"))?
            .to_string();
        let name = parts.next().map(unquote);
        return Ok(Selector::Role {
            role,
            name,
            exact: false,
        });
    }

    // Bare CSS shorthand: #id or .class
    if s.starts_with('#') || s.starts_with('.') {
        return Ok(Selector::Css { value: s.to_string() });
    }

    Err(format!("unrecognized selector string: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) {
        let parsed = parse_selector(s).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(format_selector(&parsed), s, "round-trip mismatch for {s}");
    }

    #[test]
    fn round_trips_canonical_forms() {
        roundtrip("css:#submit");
        roundtrip("xpath://button[1]");
        roundtrip(r#"text:"Sign in""#);
        roundtrip(r#"label:"Email""#);
        roundtrip(r#"placeholder:"Search""#);
        roundtrip("testid:login-button");
        roundtrip("coords:10,20");
        roundtrip(r#"semantic:"the blue submit button""#);
    }

    #[test]
    fn round_trips_role_with_name() {
        roundtrip(r#"role:button:"Sign in""#);
        roundtrip("role:button");
    }

    #[test]
    fn ref_shorthand_parses() {
        assert_eq!(
            parse_selector("@submit").unwrap(),
            Selector::Ref { ref_id: "@submit".into() }
        );
        assert_eq!(
            parse_selector("ref:@submit").unwrap(),
            Selector::Ref { ref_id: "@submit".into() }
        );
    }

    #[test]
    fn positional_ref_compatibility() {
        assert_eq!(
            parse_selector("e3").unwrap(),
            Selector::Ref { ref_id: "e3".into() }
        );
    }

    #[test]
    fn bare_css_shorthand() {
        assert_eq!(
            parse_selector("#login").unwrap(),
            Selector::Css { value: "#login".into() }
        );
        assert_eq!(
            parse_selector(".btn-primary").unwrap(),
            Selector::Css { value: ".btn-primary".into() }
        );
    }

    #[test]
    fn semantic_falls_back_to_text() {
        let sel = Selector::Semantic {
            description: "the submit button".into(),
        };
        assert_eq!(
            sel.resolved_for_engine(),
            Selector::Text {
                value: "the submit button".into(),
                exact: false
            }
        );
    }

    #[test]
    fn unrecognized_string_is_an_error() {
        assert!(parse_selector("???not-a-selector").is_err());
    }
}
