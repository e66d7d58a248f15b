//! Scope authorization (spec.md §4.3, §4.5 step 2, §8 property 2).
//!
//! Every method name maps to a small any-of set of required scopes, each of
//! the form `category:action`. `*` grants everything; `category:*` grants
//! every action in that category. A method outside the closed set (spec.md
//! §6.2) is not representable here — the dispatcher rejects it as
//! `MethodNotFound` before scope checking runs — but as a defense in depth
//! `required_scopes_for` still falls back to requiring `*` for anything it
//! doesn't recognize.

use std::collections::HashSet;

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("no scope mapping for method '{0}'")]
    Unmapped(String),
}

/// The scopes (any-of) required to call `method`. Never empty: an unmapped
/// method still requires `*`, matching spec.md's "unknown methods require
/// `*`" rule.
pub fn required_scopes_for(method: &str) -> Vec<String> {
    let category = method.split('/').next().unwrap_or(method);

    let specific: &[&str] = match method {
        "initialize" | "shutdown" | "notifications/initialized" => &[],
        "browser/launch" => &["browser:launch"],
        "browser/close" => &["browser:close"],
        "context/create" => &["context:create"],
        "context/list" => &["context:read"],
        "context/destroy" => &["context:destroy"],
        "page/create" => &["page:create"],
        "page/navigate" => &["page:navigate"],
        "page/reload" | "page/goBack" | "page/goForward" => &["page:navigate"],
        "page/close" => &["page:close"],
        "page/list" | "page/activate" => &["page:read"],
        "frame/list" | "frame/switch" | "frame/main" => &["frame:read"],
        "action/click" | "action/dblclick" | "action/type" | "action/fill" | "action/clear"
        | "action/press" | "action/hover" | "action/scroll" | "action/select" | "action/check"
        | "action/uncheck" | "action/upload" | "action/drag" => &["action:write"],
        "observe/screenshot" | "observe/accessibility" | "observe/dom" | "observe/element"
        | "observe/pdf" | "observe/content" | "observe/ariaSnapshot" => &["observe:read"],
        "storage/getState" | "storage/getCookies" => &["storage:read"],
        "storage/setState" | "storage/setCookies" | "storage/clearCookies" => &["storage:write"],
        "network/intercept" | "network/fulfill" | "network/abort" | "network/continue" => {
            &["network:intercept"]
        }
        "emulate/setViewport" | "emulate/setUserAgent" | "emulate/setGeolocation"
        | "emulate/setOffline" => &["emulate:write"],
        "dialog/handle" => &["dialog:write"],
        "trace/start" | "trace/stop" => &["trace:write"],
        "events/subscribe" => &["events:subscribe"],
        "stream/cancel" => &["stream:cancel"],
        "approval/respond" => &["approval:respond"],
        "agent/act" => &["agent:act"],
        "agent/observe" => &["agent:observe"],
        "agent/extract" => &["agent:extract"],
        _ => &["*"],
    };

    if specific.is_empty() {
        return Vec::new();
    }
    let mut scopes: Vec<String> = specific.iter().map(|s| s.to_string()).collect();
    scopes.push(format!("{category}:*"));
    scopes
}

/// Whether `granted` authorizes `method`, per the any-of / wildcard rules.
pub fn scope_allows(granted: &HashSet<String>, method: &str) -> bool {
    if granted.contains("*") {
        return true;
    }
    let required = required_scopes_for(method);
    if required.is_empty() {
        return true;
    }
    required.iter().any(|scope| granted.contains(scope))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(scopes: &[&str]) -> HashSet<String> {
        scopes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wildcard_grants_everything() {
        assert!(scope_allows(&set(&["*"]), "browser/launch"));
        assert!(scope_allows(&set(&["*"]), "totally/unknown"));
    }

    #[test]
    fn category_wildcard_grants_category_actions() {
        assert!(scope_allows(&set(&["action:*"]), "action/click"));
        assert!(!scope_allows(&set(&["action:*"]), "browser/launch"));
    }

    #[test]
    fn specific_scope_grants_matching_method_only() {
        assert!(scope_allows(&set(&["browser:launch"]), "browser/launch"));
        assert!(!scope_allows(&set(&["browser:launch"]), "browser/close"));
    }

    #[test]
    fn lifecycle_methods_need_no_scope() {
        assert!(scope_allows(&set(&[]), "initialize"));
        assert!(scope_allows(&set(&[]), "notifications/initialized"));
    }

    #[test]
    fn unmapped_method_requires_wildcard() {
        assert!(!scope_allows(&set(&["observe:read"]), "totally/unknown"));
        assert!(scope_allows(&set(&["*"]), "totally/unknown"));
    }

    #[test]
    fn unknown_error_display() {
        let err = ScopeError::Unmapped("foo/bar".into());
        assert_eq!(err.to_string(), "no scope mapping for method 'foo/bar'");
    }
}
