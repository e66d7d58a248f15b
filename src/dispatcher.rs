//! Top-level request pipeline (spec.md §4.5 "Request Processing"): the
//! policy pre-checks every request passes through before `handlers::dispatch`
//! ever sees it, and the encoding step that turns a handler's `BapResult`
//! back into a wire frame.
//!
//! Grounded on the teacher's MCP tool-call path (`ToolRouter::call` in
//! `src/tools/mod.rs`), which runs auth/rate-limit checks ahead of a single
//! dispatch match; generalized here to the full scope + rate-limit chain
//! spec.md §4.5 names.

use crate::approval::{await_decision, decision_to_result, new_pending, ApprovalContext, ApprovalRequiredNotification};
use crate::config::Config;
use crate::error::{BapError, BapResult};
use crate::handlers;
use crate::policy::{scope_allows, required_scopes_for};
use crate::protocol::{encode_notification, encode_response_error, encode_response_ok};
use crate::rate_limit::REQUESTS;
use crate::session::Session;
use serde_json::{json, Value};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Run one already-parsed request through the pre-handler policy chain and
/// return the encoded wire frame (`result` or `error`, never both).
pub async fn handle_request(
    session: &mut Session,
    config: &Config,
    id: Value,
    method: &str,
    params: Option<Value>,
) -> String {
    session.touch(Instant::now());
    match process(session, config, method, params).await {
        Ok(result) => encode_response_ok(id, result),
        Err(err) => {
            tracing::debug!(method, code = err.code.code(), message = %err.message, "request failed");
            encode_response_error(id, &err)
        }
    }
}

async fn process(session: &mut Session, config: &Config, method: &str, params: Option<Value>) -> BapResult<Value> {
    if method != "initialize" && !session.initialized {
        return Err(BapError::not_initialized());
    }

    if !scope_allows(&session.scopes, method) {
        return Err(BapError::unauthorized(&required_scopes_for(method)));
    }

    session.rate_limiter.check_and_increment(REQUESTS, Instant::now())?;

    let params = params.unwrap_or(Value::Object(serde_json::Map::new()));

    if let Some(rule) = config.approval_rules.iter().find(|r| r.matches(method)) {
        if !session.session_approved_rules.contains(&rule.name) {
            require_approval(session, config, rule, method, &params).await?;
        }
    }

    handlers::dispatch(session, config, method, params).await
}

/// Suspend the request pending a human decision (spec.md §4.11). Pushes
/// `approval/required` over the session's outbound channel and blocks this
/// request's task until `approval/respond` resolves the pending entry or
/// the configured timeout elapses.
async fn require_approval(
    session: &mut Session,
    config: &Config,
    rule: &crate::approval::ApprovalRule,
    method: &str,
    params: &Value,
) -> BapResult<()> {
    let (request_id, pending, awaiter) = new_pending(&rule.name);

    let (page_url, page_title) = match session.active_page_id.clone().and_then(|id| session.pages.get(&id)) {
        Some(state) => (state.page.url().await.ok(), state.page.title().await.ok()),
        None => (None, None),
    };

    let expires_at_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        + config.approval_timeout.as_millis() as u64;

    let notification = ApprovalRequiredNotification {
        request_id: request_id.clone(),
        original_request: json!({ "method": method, "params": params }),
        rule: rule.name.clone(),
        context: ApprovalContext {
            page_url,
            page_title,
            screenshot: None,
            element_info: None,
        },
        expires_at_ms,
    };

    session.pending_approvals.insert(request_id.clone(), pending);
    session.notify(encode_notification(
        "approval/required",
        serde_json::to_value(&notification).unwrap_or(Value::Null),
    ));

    let decision = await_decision(awaiter, config.approval_timeout).await?;
    decision_to_result(decision)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Instant;

    fn session() -> Session {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let (close_tx, _close_rx) = tokio::sync::watch::channel(false);
        Session::new("sess_test".to_string(), HashSet::from(["*".to_string()]), Instant::now(), tx, close_tx)
    }

    #[tokio::test]
    async fn uninitialized_session_rejects_non_initialize_methods() {
        let mut s = session();
        let config = Config::from_env();
        let err = process(&mut s, &config, "browser/launch", None).await.unwrap_err();
        assert_eq!(err.code.code(), crate::error::ErrorCode::NotInitialized.code());
    }

    #[tokio::test]
    async fn initialize_succeeds_without_prior_init() {
        let mut s = session();
        let config = Config::from_env();
        let result = process(&mut s, &config, "initialize", Some(serde_json::json!({ "protocolVersion": "1.0.0" }))).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_scope_is_rejected() {
        let mut s = session();
        s.scopes = HashSet::new();
        s.initialized = true;
        let config = Config::from_env();
        let err = process(&mut s, &config, "browser/launch", Some(serde_json::json!({}))).await.unwrap_err();
        assert_eq!(err.code.code(), crate::error::ErrorCode::Unauthorized.code());
    }

    #[tokio::test]
    async fn matching_approval_rule_suspends_and_notifies() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (close_tx, _close_rx) = tokio::sync::watch::channel(false);
        let mut s = Session::new("sess_test".to_string(), HashSet::from(["*".to_string()]), Instant::now(), tx, close_tx);
        s.initialized = true;
        let mut config = Config::from_env();
        config.scopes = HashSet::from(["*".to_string()]);
        config.approval_timeout = std::time::Duration::from_millis(10);
        config.approval_rules = vec![crate::approval::ApprovalRule {
            name: "danger".to_string(),
            method_pattern: "browser/launch".to_string(),
        }];

        let err = process(&mut s, &config, "browser/launch", Some(serde_json::json!({}))).await.unwrap_err();
        assert_eq!(err.code.code(), crate::error::ErrorCode::ApprovalTimeout.code());

        let msg = rx.try_recv().expect("approval/required notification sent");
        let frame = match msg {
            crate::session::OutboundMessage::Frame(f) => f,
            crate::session::OutboundMessage::Close { .. } => panic!("expected a frame, not a close"),
        };
        assert!(frame.contains("approval/required"));
        assert!(frame.contains("\"rule\":\"danger\""));
    }

    #[tokio::test]
    async fn session_approved_rule_skips_suspension() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let (close_tx, _close_rx) = tokio::sync::watch::channel(false);
        let mut s = Session::new("sess_test".to_string(), HashSet::from(["*".to_string()]), Instant::now(), tx, close_tx);
        s.initialized = true;
        s.session_approved_rules.insert("danger".to_string());
        let mut config = Config::from_env();
        config.scopes = HashSet::from(["*".to_string()]);
        config.approval_rules = vec![crate::approval::ApprovalRule {
            name: "danger".to_string(),
            method_pattern: "page/list".to_string(),
        }];

        let result = process(&mut s, &config, "page/list", Some(serde_json::json!({}))).await;
        assert!(result.is_ok());
    }
}
