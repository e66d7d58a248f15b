//! `approval/respond` (spec.md §4.11 "Pending Approval").

use crate::approval::ApprovalDecision;
use crate::error::{BapError, BapResult, ErrorCode};
use crate::session::Session;
use serde_json::{json, Value};

pub fn respond(session: &mut Session, params: Value) -> BapResult<Value> {
    let request_id = params
        .get("requestId")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'requestId'"))?
        .to_string();
    let decision_raw = params
        .get("decision")
        .cloned()
        .ok_or_else(|| BapError::invalid_params("Missing 'decision'"))?;
    let decision: ApprovalDecision = serde_json::from_value(decision_raw)
        .map_err(|e| BapError::invalid_params(format!("Invalid 'decision': {e}")))?;

    let pending = session
        .pending_approvals
        .remove(&request_id)
        .ok_or_else(|| BapError::new(ErrorCode::InvalidParams, format!("Unknown or already-resolved approval: {request_id}")))?;

    if decision == ApprovalDecision::ApproveSession {
        session.session_approved_rules.insert(pending.rule.clone());
    }

    let _ = pending.responder.send(decision);
    Ok(json!({ "requestId": request_id }))
}
