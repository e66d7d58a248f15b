//! `agent/observe` pipeline (spec.md §4.10): interactive-element
//! enumeration, the registry upsert it drives, and the fused observation
//! used by `page/navigate` and `agent/act`'s pre/postObserve.
//!
//! Grounded on the teacher's `extract_page_info` (`src/page_extractor/page_info.rs`)
//! for the "evaluate a script in the page, deserialize the JSON result"
//! shape — here the evaluator is the fixed interactive-element enumerator
//! rather than a metadata extractor.

use crate::engine::{EnginePage, ObservedElement};
use crate::error::BapResult;
use crate::registry::{ElementIdentity, ElementRegistry, RefStability};
use serde::Serialize;
use std::time::Instant;

pub const DEFAULT_MAX_ELEMENTS: usize = 50;
pub const HARD_MAX_ELEMENTS: usize = 200;

/// The fixed CSS union + filtering script described in spec.md §4.10. Kept
/// as an opaque string per the spec's "treat in-page evaluators as opaque
/// scripts" design note; only its documented input/output shape is a
/// contract with the rest of the crate.
pub const INTERACTIVE_ELEMENT_SCRIPT: &str = r#"
(() => {
  const SELECTOR = [
    'a[href]', 'button', 'input', 'select', 'textarea',
    '[role="button"]', '[role="link"]', '[role="checkbox"]', '[role="radio"]',
    '[role="tab"]', '[role="menuitem"]', '[role="option"]', '[role="switch"]',
    '[contenteditable="true"]', '[onclick]', '[tabindex]'
  ].join(',');
  const out = [];
  for (const el of document.querySelectorAll(SELECTOR)) {
    const style = getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    if (style.display === 'none' || style.visibility === 'hidden' || (rect.width === 0 && rect.height === 0)) continue;
    out.push({
      role: el.getAttribute('role') || el.tagName.toLowerCase(),
      accessibleName: el.getAttribute('aria-label') || (el.innerText || '').trim().slice(0, 200),
      value: el.value ?? null,
      tagName: el.tagName.toLowerCase(),
      focused: document.activeElement === el,
      disabled: !!el.disabled,
      testId: el.getAttribute('data-testid') || el.getAttribute('data-test-id'),
      domId: el.id || null,
      nameAttr: el.getAttribute('name'),
      ariaLabel: el.getAttribute('aria-label'),
      parentRole: el.parentElement ? (el.parentElement.getAttribute('role') || el.parentElement.tagName.toLowerCase()) : null,
      siblingIndex: Array.prototype.indexOf.call(el.parentElement ? el.parentElement.children : [], el),
      cssPath: (() => {
        const parts = [];
        let node = el;
        while (node && node.tagName && node.tagName.toLowerCase() !== 'body' && !node.id) {
          const parent = node.parentElement;
          const index = parent ? Array.prototype.indexOf.call(parent.children, node) + 1 : 1;
          parts.unshift(`${node.tagName.toLowerCase()}:nth-of-type(${index})`);
          node = parent;
        }
        if (node && node.id) parts.unshift(`#${node.id}`);
        return parts.join(' > ');
      })(),
      bounds: [rect.x, rect.y, rect.width, rect.height],
    });
  }
  return out;
})()
"#;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementObservation {
    pub ref_id: String,
    pub stability: RefStability,
    pub previous_ref: Option<String>,
    pub role: String,
    pub accessible_name: Option<String>,
    pub value: Option<String>,
    pub tag_name: String,
    pub focused: bool,
    pub disabled: bool,
    pub clickable: bool,
    pub editable: bool,
    pub selectable: bool,
    pub checkable: bool,
    pub selector: String,
    pub bounds: Option<(f64, f64, f64, f64)>,
}

fn action_hints(tag_name: &str, role: &str) -> (bool, bool, bool, bool) {
    let clickable = matches!(tag_name, "a" | "button") || matches!(role, "button" | "link" | "menuitem" | "tab");
    let editable = matches!(tag_name, "input" | "textarea") || role == "textbox";
    let selectable = tag_name == "select" || role == "option";
    let checkable = matches!(role, "checkbox" | "radio" | "switch");
    (clickable, editable, selectable, checkable)
}

/// Precedence chain from spec.md §4.10: testId -> aria-label/role -> short
/// visible text -> id -> name attribute -> structural fallback. `css_path`
/// is the caller-supplied structural fallback (computed in-page, since it
/// needs live DOM structure this module doesn't have).
pub fn compute_selector(
    test_id: Option<&str>,
    aria_label: Option<&str>,
    role: &str,
    accessible_name: Option<&str>,
    dom_id: Option<&str>,
    name_attr: Option<&str>,
    css_path: &str,
) -> String {
    if let Some(v) = test_id {
        return format!("testId:{v}");
    }
    if let Some(label) = aria_label {
        return format!("role:{role}:\"{label}\"");
    }
    if let Some(text) = accessible_name {
        let trimmed = text.trim();
        if !trimmed.is_empty() && trimmed.chars().count() < 50 {
            return format!("text:\"{trimmed}\"");
        }
    }
    if let Some(id) = dom_id {
        return format!("css:#{id}");
    }
    if let Some(name) = name_attr {
        return format!("css:[name={name}]");
    }
    format!("css:{css_path}")
}

#[derive(Debug, Clone, Default)]
pub struct ObserveOptions {
    pub refresh_refs: bool,
    pub report_history: bool,
    pub filter_roles: Option<Vec<String>>,
    pub max_elements: usize,
}

/// Run one `agent/observe` pass: reset/evict the registry as needed,
/// enumerate elements via the page-side script, and upsert each into the
/// registry (spec.md §4.8 steps 1-7 driven from here).
pub async fn observe_elements(
    page: &dyn EnginePage,
    registry: &mut ElementRegistry,
    options: &ObserveOptions,
) -> BapResult<Vec<ElementObservation>> {
    let now = Instant::now();
    let page_url = page.url().await.map_err(|e| crate::error::BapError::internal(e.to_string()))?;
    registry.begin_observation(&page_url, options.refresh_refs, now);

    let raw = page
        .evaluate(INTERACTIVE_ELEMENT_SCRIPT)
        .await
        .map_err(|e| crate::error::BapError::internal(e.to_string()))?;
    let elements: Vec<ObservedElement> = serde_json::from_value(raw).unwrap_or_default();

    let requested = if options.max_elements == 0 { DEFAULT_MAX_ELEMENTS } else { options.max_elements };
    let max_elements = requested.clamp(1, HARD_MAX_ELEMENTS);

    let mut observations = Vec::new();
    for (index, el) in elements.into_iter().enumerate() {
        if let Some(filter) = &options.filter_roles
            && !filter.contains(&el.role)
        {
            continue;
        }
        if observations.len() >= max_elements {
            break;
        }

        let identity = ElementIdentity {
            test_id: el.test_id.clone(),
            id: el.dom_id.clone(),
            aria_label: el.aria_label.clone(),
            role: el.role.clone(),
            name: el.accessible_name.clone(),
            tag_name: el.tag_name.clone(),
            parent_role: el.parent_role.clone(),
            sibling_index: el.sibling_index.or(Some(index as u32)),
        };
        let selector = compute_selector(
            el.test_id.as_deref(),
            el.aria_label.as_deref(),
            el.role.as_str(),
            el.accessible_name.as_deref(),
            el.dom_id.as_deref(),
            el.name_attr.as_deref(),
            &el.css_path,
        );
        let outcome = registry.upsert(identity, selector.clone(), el.bounds, now, options.report_history);
        let (clickable, editable, selectable, checkable) = action_hints(&el.tag_name, &el.role);

        observations.push(ElementObservation {
            ref_id: outcome.ref_id,
            stability: outcome.stability,
            previous_ref: outcome.previous_ref,
            role: el.role,
            accessible_name: el.accessible_name,
            value: el.value,
            tag_name: el.tag_name,
            focused: el.focused,
            disabled: el.disabled,
            clickable,
            editable,
            selectable,
            checkable,
            selector,
            bounds: el.bounds,
        });
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_priority_prefers_test_id() {
        let sel = compute_selector(Some("submit"), Some("Submit"), "button", Some("Submit"), Some("x"), None, "body > button");
        assert_eq!(sel, "testId:submit");
    }

    #[test]
    fn selector_falls_back_to_aria_label() {
        let sel = compute_selector(None, Some("Close dialog"), "button", Some("X"), None, None, "body > button");
        assert_eq!(sel, "role:button:\"Close dialog\"");
    }

    #[test]
    fn selector_falls_back_to_short_text() {
        let sel = compute_selector(None, None, "button", Some("Submit"), None, None, "body > button");
        assert_eq!(sel, "text:\"Submit\"");
    }

    #[test]
    fn selector_rejects_long_text_falls_through_to_id() {
        let long_text = "x".repeat(60);
        let sel = compute_selector(None, None, "div", Some(&long_text), Some("main-cta"), None, "body > div");
        assert_eq!(sel, "css:#main-cta");
    }

    #[test]
    fn action_hints_identify_clickable_button() {
        let (clickable, editable, selectable, checkable) = action_hints("button", "button");
        assert!(clickable);
        assert!(!editable);
        assert!(!selectable);
        assert!(!checkable);
    }
}
