//! Audit log: one JSON object per line on stderr (spec.md §6.6), kept
//! separate from `tracing`'s structured application logs so a deployment
//! can route security-relevant events to a distinct sink without touching
//! log levels or formatters.

use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    AuthSuccess,
    AuthFailed,
    OriginRejected,
    ConnectionLimit,
    TlsRequired,
    AuthorizationDenied,
    PathTraversalAttempt,
    PathNotAllowed,
    PathBlocked,
    SelectorInjection,
    SelectorTooLong,
    ValueRedacted,
    StorageStateExtracted,
    StorageStateBlocked,
    SessionExpired,
}

impl AuditEvent {
    fn name(self) -> &'static str {
        use AuditEvent::*;
        match self {
            AuthSuccess => "AUTH_SUCCESS",
            AuthFailed => "AUTH_FAILED",
            OriginRejected => "ORIGIN_REJECTED",
            ConnectionLimit => "CONNECTION_LIMIT",
            TlsRequired => "TLS_REQUIRED",
            AuthorizationDenied => "AUTHORIZATION_DENIED",
            PathTraversalAttempt => "PATH_TRAVERSAL_ATTEMPT",
            PathNotAllowed => "PATH_NOT_ALLOWED",
            PathBlocked => "PATH_BLOCKED",
            SelectorInjection => "SELECTOR_INJECTION",
            SelectorTooLong => "SELECTOR_TOO_LONG",
            ValueRedacted => "VALUE_REDACTED",
            StorageStateExtracted => "STORAGE_STATE_EXTRACTED",
            StorageStateBlocked => "STORAGE_STATE_BLOCKED",
            SessionExpired => "SESSION_EXPIRED",
        }
    }
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    event: &'a str,
    #[serde(flatten)]
    details: serde_json::Value,
}

/// Emit one audit record. `details` is merged into the top-level object
/// alongside `timestamp`/`event`; pass `serde_json::json!({})` for none.
pub fn record(event: AuditEvent, details: serde_json::Value) {
    let record = AuditRecord {
        timestamp: chrono::Utc::now().to_rfc3339(),
        event: event.name(),
        details,
    };
    match serde_json::to_string(&record) {
        Ok(line) => {
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{line}");
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize audit record"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_does_not_panic_on_empty_details() {
        record(AuditEvent::AuthSuccess, serde_json::json!({}));
    }

    #[test]
    fn event_names_match_spec_identifiers() {
        assert_eq!(AuditEvent::PathTraversalAttempt.name(), "PATH_TRAVERSAL_ATTEMPT");
        assert_eq!(AuditEvent::SessionExpired.name(), "SESSION_EXPIRED");
    }
}
