//! Event subscription and notification fan-out (spec.md §4.12).
//!
//! `events/subscribe` sets a per-session filter; engine callbacks are
//! translated into JSON-RPC notifications only for subscribed kinds.

use serde::Serialize;
use std::collections::HashSet;

pub const ALL_EVENT_KINDS: &[&str] = &[
    "page", "console", "network/request", "network/response", "network/failed", "dialog", "download",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageEventKind {
    Load,
    DomContentLoaded,
    Close,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEvent {
    pub page_id: String,
    pub kind: PageEventKind,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEvent {
    pub page_id: String,
    pub level: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub page_id: String,
    pub request_id: String,
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogEvent {
    pub page_id: String,
    pub dialog_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEvent {
    pub page_id: String,
    pub url: String,
    pub suggested_filename: String,
}

/// Engine callback, pre-translation. The dispatcher's event loop maps each
/// variant to its wire notification only when its dimension is subscribed.
#[derive(Debug, Clone)]
pub enum EngineCallback {
    Page(PageEvent),
    Console(ConsoleEvent),
    NetworkRequest(NetworkEvent),
    NetworkResponse(NetworkEvent),
    NetworkFailed(NetworkEvent),
    Dialog(DialogEvent),
    Download(DownloadEvent),
}

impl EngineCallback {
    fn dimension(&self) -> &'static str {
        match self {
            EngineCallback::Page(_) => "page",
            EngineCallback::Console(_) => "console",
            EngineCallback::NetworkRequest(_) => "network/request",
            EngineCallback::NetworkResponse(_) => "network/response",
            EngineCallback::NetworkFailed(_) => "network/failed",
            EngineCallback::Dialog(_) => "dialog",
            EngineCallback::Download(_) => "download",
        }
    }

    pub fn notification_method(&self) -> &'static str {
        match self {
            EngineCallback::Page(_) => "page",
            EngineCallback::Console(_) => "console",
            EngineCallback::NetworkRequest(_) => "network/request",
            EngineCallback::NetworkResponse(_) => "network/response",
            EngineCallback::NetworkFailed(_) => "network/failed",
            EngineCallback::Dialog(_) => "dialog",
            EngineCallback::Download(_) => "download",
        }
    }

    pub fn to_params(&self) -> serde_json::Value {
        match self {
            EngineCallback::Page(e) => serde_json::to_value(e),
            EngineCallback::Console(e) => serde_json::to_value(e),
            EngineCallback::NetworkRequest(e) | EngineCallback::NetworkResponse(e) | EngineCallback::NetworkFailed(e) => {
                serde_json::to_value(e)
            }
            EngineCallback::Dialog(e) => serde_json::to_value(e),
            EngineCallback::Download(e) => serde_json::to_value(e),
        }
        .unwrap_or(serde_json::Value::Null)
    }
}

/// Whether `callback` should be forwarded given the session's subscribed
/// set. An unsubscribed session (empty set) receives nothing.
pub fn should_forward(subscribed: &HashSet<String>, callback: &EngineCallback) -> bool {
    subscribed.contains(callback.dimension())
}

pub fn validate_event_kinds(kinds: &[String]) -> Result<(), crate::error::BapError> {
    for kind in kinds {
        if !ALL_EVENT_KINDS.contains(&kind.as_str()) {
            return Err(crate::error::BapError::invalid_params(format!("Unknown event kind: {kind}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> EngineCallback {
        EngineCallback::Page(PageEvent { page_id: "p1".into(), kind: PageEventKind::Load, url: None })
    }

    #[test]
    fn unsubscribed_session_receives_nothing() {
        assert!(!should_forward(&HashSet::new(), &event()));
    }

    #[test]
    fn subscribed_dimension_forwards() {
        let mut subs = HashSet::new();
        subs.insert("page".to_string());
        assert!(should_forward(&subs, &event()));
    }

    #[test]
    fn rejects_unknown_event_kind() {
        assert!(validate_event_kinds(&["teleport".to_string()]).is_err());
    }

    #[test]
    fn accepts_known_event_kinds() {
        assert!(validate_event_kinds(&["page".to_string(), "console".to_string()]).is_ok());
    }
}
