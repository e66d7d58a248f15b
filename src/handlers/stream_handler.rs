//! `stream/cancel` (spec.md §4.11 "Active Stream").

use crate::error::{BapError, BapResult, ErrorCode};
use crate::session::Session;
use serde_json::{json, Value};

pub fn cancel(session: &mut Session, params: Value) -> BapResult<Value> {
    let stream_id = params
        .get("streamId")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'streamId'"))?;
    let stream = session
        .active_streams
        .get_mut(stream_id)
        .ok_or_else(|| BapError::new(ErrorCode::StreamNotFound, format!("Unknown stream: {stream_id}")))?;
    stream.cancelled = true;
    Ok(json!({ "streamId": stream_id, "cancelled": true }))
}
