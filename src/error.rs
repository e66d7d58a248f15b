//! Closed error taxonomy for the wire protocol.
//!
//! Every error that can reach a client is a `BapError` carrying a stable
//! JSON-RPC error code plus a `{retryable, retry_after_ms?, details?}` data
//! object. Engine-native errors are translated into this taxonomy by
//! matching on the engine's message (see `from_engine_message`) before they
//! ever reach the wire — the client never sees a raw `chromiumoxide` error.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Stable JSON-RPC error codes. Negative range per the 2.0 spec; BAP reserves
/// -32000..-32099 for its own taxonomy alongside the standard -326xx codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    NotInitialized,
    AlreadyInitialized,
    BrowserNotLaunched,
    ElementNotFound,
    ElementNotVisible,
    ElementNotEnabled,
    SelectorAmbiguous,
    NavigationFailed,
    Timeout,
    TargetClosed,
    ExecutionContextDestroyed,
    ContextNotFound,
    ResourceLimitExceeded,
    ApprovalRequired,
    ApprovalDenied,
    ApprovalTimeout,
    FrameNotFound,
    FrameDomainNotAllowed,
    StreamNotFound,
    StreamCancelled,
    Unauthorized,
    RateLimited,
    InvalidState,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        use ErrorCode::*;
        match self {
            ParseError => -32700,
            InvalidRequest => -32600,
            MethodNotFound => -32601,
            InvalidParams => -32602,
            Internal => -32603,
            NotInitialized => -32001,
            AlreadyInitialized => -32002,
            BrowserNotLaunched => -32003,
            ElementNotFound => -32004,
            ElementNotVisible => -32005,
            ElementNotEnabled => -32006,
            SelectorAmbiguous => -32007,
            NavigationFailed => -32008,
            Timeout => -32009,
            TargetClosed => -32010,
            ExecutionContextDestroyed => -32011,
            ContextNotFound => -32012,
            ResourceLimitExceeded => -32013,
            ApprovalRequired => -32014,
            ApprovalDenied => -32015,
            ApprovalTimeout => -32016,
            FrameNotFound => -32017,
            FrameDomainNotAllowed => -32018,
            StreamNotFound => -32019,
            StreamCancelled => -32020,
            RateLimited => -32021,
            Unauthorized => -32023,
            InvalidState => -32022,
        }
    }

    /// Whether errors of this class are safe for a client to retry.
    pub fn retryable(self) -> bool {
        use ErrorCode::*;
        matches!(
            self,
            ElementNotFound
                | ElementNotVisible
                | ElementNotEnabled
                | SelectorAmbiguous
                | NavigationFailed
                | Timeout
                | RateLimited
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorData {
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// A fully-formed wire error: `{code, message, data}`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BapError {
    pub code: ErrorCode,
    pub message: String,
    pub retry_after_ms: Option<u64>,
    pub details: Option<serde_json::Value>,
}

impl BapError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_ms: None,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, d: Duration) -> Self {
        self.retry_after_ms = Some(d.as_millis() as u64);
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code.code(),
            "message": self.message,
            "data": ErrorData {
                retryable: self.code.retryable(),
                retry_after_ms: self.retry_after_ms,
                details: self.details.clone(),
            },
        })
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Unknown method: {method}"))
    }

    pub fn not_initialized() -> Self {
        Self::new(
            ErrorCode::NotInitialized,
            "Session has not called `initialize` yet",
        )
    }

    pub fn already_initialized() -> Self {
        Self::new(ErrorCode::AlreadyInitialized, "Session is already initialized")
    }

    pub fn unauthorized(required_scopes: &[String]) -> Self {
        Self::new(ErrorCode::Unauthorized, "Missing required scope").with_details(
            serde_json::json!({ "requiredScopes": required_scopes }),
        )
    }

    pub fn element_not_found(selector_desc: &str) -> Self {
        Self::new(
            ErrorCode::ElementNotFound,
            format!("No element matched selector: {selector_desc}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Translate an engine-native error message into the canonical taxonomy.
    ///
    /// Engine errors carry free-form text (`chromiumoxide`/CDP error
    /// strings); we never forward that text as-is except for the classes the
    /// spec explicitly allows (§7: target/timeout/element errors keep the
    /// raw engine message, everything else gets the canonical sentence).
    pub fn from_engine_message(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.contains("timeout") {
            Self::new(ErrorCode::Timeout, raw).with_retry_after(Duration::from_secs(1))
        } else if lower.contains("target closed") {
            Self::new(ErrorCode::TargetClosed, raw)
        } else if lower.contains("execution context was destroyed")
            || lower.contains("execution context destroyed")
        {
            Self::new(ErrorCode::ExecutionContextDestroyed, raw)
        } else if lower.contains("not visible") || lower.contains("waiting for") && lower.contains("visible")
        {
            Self::new(ErrorCode::ElementNotVisible, raw)
        } else if lower.contains("not enabled") {
            Self::new(ErrorCode::ElementNotEnabled, raw)
        } else if lower.contains("navigation") {
            Self::new(ErrorCode::NavigationFailed, raw).with_retry_after(Duration::from_secs(1))
        } else {
            Self::new(ErrorCode::Internal, "Internal server error")
        }
    }
}

pub type BapResult<T> = Result<T, BapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_maps_to_timeout_code() {
        let err = BapError::from_engine_message("Timeout 30000ms exceeded waiting for selector");
        assert_eq!(err.code.code(), ErrorCode::Timeout.code());
        assert!(err.code.retryable());
        assert_eq!(err.retry_after_ms, Some(1000));
    }

    #[test]
    fn unknown_engine_message_becomes_generic_internal() {
        let err = BapError::from_engine_message("some bizarre driver panic");
        assert_eq!(err.code.code(), ErrorCode::Internal.code());
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn not_visible_preserves_raw_message() {
        let err = BapError::from_engine_message("element is not visible");
        assert_eq!(err.code.code(), ErrorCode::ElementNotVisible.code());
        assert_eq!(err.message, "element is not visible");
    }
}
