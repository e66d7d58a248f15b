//! Human-in-the-loop approval workflow (spec.md §4.11, §3 "Pending Approval").
//!
//! Grounded on the teacher's `ResearchSessionManager`'s `Arc<Mutex<_>>` +
//! oneshot-style lifecycle (`src/research/session_manager.rs`), adapted
//! here to `tokio::sync::oneshot` so a dispatcher task can suspend a
//! request and a later `approval/respond` call on the same connection can
//! resume it.

use crate::error::{BapError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalDecision {
    Approve,
    Deny,
    ApproveOnce,
    ApproveSession,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalContext {
    pub page_url: Option<String>,
    pub page_title: Option<String>,
    pub screenshot: Option<String>,
    pub element_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequiredNotification {
    pub request_id: String,
    pub original_request: serde_json::Value,
    pub rule: String,
    pub context: ApprovalContext,
    pub expires_at_ms: u64,
}

/// A rule matching incoming requests that should be suspended for approval.
#[derive(Debug, Clone)]
pub struct ApprovalRule {
    pub name: String,
    pub method_pattern: String,
}

impl ApprovalRule {
    pub fn matches(&self, method: &str) -> bool {
        if let Some(prefix) = self.method_pattern.strip_suffix("/*") {
            method.starts_with(prefix)
        } else {
            self.method_pattern == method
        }
    }
}

/// Server-side half of a suspended request, stored in `Session::pending_approvals`.
pub struct PendingApproval {
    pub request_id: String,
    pub rule: String,
    pub responder: oneshot::Sender<ApprovalDecision>,
}

/// Client-side handle awaited by the dispatcher task that suspended the
/// request.
pub struct ApprovalAwaiter {
    pub receiver: oneshot::Receiver<ApprovalDecision>,
}

pub fn new_pending(rule: &str) -> (String, PendingApproval, ApprovalAwaiter) {
    let request_id = format!("approval_{}", Uuid::new_v4());
    let (tx, rx) = oneshot::channel();
    (
        request_id.clone(),
        PendingApproval { request_id, rule: rule.to_string(), responder: tx },
        ApprovalAwaiter { receiver: rx },
    )
}

/// Wait for the decision, or time out per spec.md §4.11 ("Timeout expires
/// the pending approval with `ApprovalTimeout`").
pub async fn await_decision(awaiter: ApprovalAwaiter, timeout: Duration) -> Result<ApprovalDecision, BapError> {
    match tokio::time::timeout(timeout, awaiter.receiver).await {
        Ok(Ok(decision)) => Ok(decision),
        Ok(Err(_)) => Err(BapError::new(ErrorCode::TargetClosed, "Approval channel closed")),
        Err(_) => Err(BapError::new(ErrorCode::ApprovalTimeout, "Approval request timed out")),
    }
}

pub fn decision_to_result(decision: ApprovalDecision) -> Result<bool, BapError> {
    match decision {
        ApprovalDecision::Approve | ApprovalDecision::ApproveOnce | ApprovalDecision::ApproveSession => Ok(true),
        ApprovalDecision::Deny => Err(BapError::new(ErrorCode::ApprovalDenied, "Request was denied by approver")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_rule_matches_method_family() {
        let rule = ApprovalRule { name: "nav".into(), method_pattern: "page/*".into() };
        assert!(rule.matches("page/navigate"));
        assert!(!rule.matches("browser/launch"));
    }

    #[test]
    fn exact_rule_matches_only_itself() {
        let rule = ApprovalRule { name: "storage".into(), method_pattern: "storage/getState".into() };
        assert!(rule.matches("storage/getState"));
        assert!(!rule.matches("storage/setState"));
    }

    #[tokio::test]
    async fn approve_resolves_ok() {
        let (_, pending, awaiter) = new_pending("nav");
        pending.responder.send(ApprovalDecision::Approve).unwrap();
        let decision = await_decision(awaiter, Duration::from_secs(1)).await.unwrap();
        assert!(decision_to_result(decision).is_ok());
    }

    #[tokio::test]
    async fn deny_produces_approval_denied_error() {
        let (_, pending, awaiter) = new_pending("nav");
        pending.responder.send(ApprovalDecision::Deny).unwrap();
        let decision = await_decision(awaiter, Duration::from_secs(1)).await.unwrap();
        let err = decision_to_result(decision).unwrap_err();
        assert_eq!(err.code.code(), ErrorCode::ApprovalDenied.code());
    }

    #[tokio::test]
    async fn timeout_produces_approval_timeout_error() {
        let (_, _pending, awaiter) = new_pending("nav");
        let err = await_decision(awaiter, Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.code.code(), ErrorCode::ApprovalTimeout.code());
    }
}
