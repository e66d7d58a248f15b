//! `network/*` (spec.md §6.2 "Network").
//!
//! The shipped `chromiumoxide` engine does not wire CDP's `Fetch` domain, so
//! interception rules cannot actually pause/rewrite live requests. Rules are
//! recorded on `Session::network_rules` and validated/echoed here so the
//! method family is observable end-to-end rather than stubbed out entirely;
//! see DESIGN.md for the scoped-down-vs-CDP-wired tradeoff.

use crate::error::{BapError, BapResult, ErrorCode};
use crate::session::Session;
use serde_json::{json, Value};
use uuid::Uuid;

pub fn intercept(session: &mut Session, params: Value) -> BapResult<Value> {
    let pattern = params
        .get("urlPattern")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'urlPattern'"))?;
    let rule_id = format!("rule_{}", Uuid::new_v4());
    session.network_rules.insert(
        rule_id.clone(),
        json!({ "urlPattern": pattern, "resourceTypes": params.get("resourceTypes").cloned().unwrap_or(Value::Null) }),
    );
    Ok(json!({ "ruleId": rule_id }))
}

fn take_rule(session: &mut Session, params: &Value) -> BapResult<String> {
    let rule_id = params
        .get("ruleId")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'ruleId'"))?
        .to_string();
    if !session.network_rules.contains_key(&rule_id) {
        return Err(BapError::new(ErrorCode::InvalidParams, format!("Unknown interception rule: {rule_id}")));
    }
    Ok(rule_id)
}

pub fn fulfill(session: &mut Session, params: Value) -> BapResult<Value> {
    let rule_id = take_rule(session, &params)?;
    Ok(json!({ "ruleId": rule_id, "action": "fulfill" }))
}

pub fn abort(session: &mut Session, params: Value) -> BapResult<Value> {
    let rule_id = take_rule(session, &params)?;
    session.network_rules.remove(&rule_id);
    Ok(json!({ "ruleId": rule_id, "action": "abort" }))
}

pub fn continue_request(session: &mut Session, params: Value) -> BapResult<Value> {
    let rule_id = take_rule(session, &params)?;
    Ok(json!({ "ruleId": rule_id, "action": "continue" }))
}
