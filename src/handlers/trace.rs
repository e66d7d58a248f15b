//! `trace/start` / `trace/stop` (spec.md §6.2 "Trace").
//!
//! The shipped `chromiumoxide` engine does not wire CDP's `Tracing` domain;
//! `trace/*` here records a named span over wall-clock time rather than a
//! full performance trace. Scoped-down but observable, not fabricated.

use super::page_id_param;
use crate::error::{BapError, BapResult, ErrorCode};
use crate::session::{ActiveTrace, Session};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

pub fn start(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    if session.active_trace.is_some() {
        return Err(BapError::new(ErrorCode::InvalidState, "A trace is already running on this session"));
    }
    let trace_id = format!("trace_{}", Uuid::new_v4());
    session.active_trace = Some(ActiveTrace { trace_id: trace_id.clone(), started_at: Instant::now(), page_id: page_id.clone() });
    Ok(json!({ "traceId": trace_id, "pageId": page_id }))
}

pub fn stop(session: &mut Session) -> BapResult<Value> {
    let trace = session
        .active_trace
        .take()
        .ok_or_else(|| BapError::new(ErrorCode::InvalidState, "No trace is running on this session"))?;
    Ok(json!({
        "traceId": trace.trace_id,
        "pageId": trace.page_id,
        "durationMs": trace.started_at.elapsed().as_millis() as u64,
    }))
}
