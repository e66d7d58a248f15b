//! `events/subscribe` (spec.md §4.12).

use crate::error::{BapError, BapResult};
use crate::events::validate_event_kinds;
use crate::session::Session;
use serde_json::{json, Value};

pub fn subscribe(session: &mut Session, params: Value) -> BapResult<Value> {
    let kinds: Vec<String> = params
        .get("kinds")
        .and_then(Value::as_array)
        .ok_or_else(|| BapError::invalid_params("Missing 'kinds'"))?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    validate_event_kinds(&kinds)?;

    session.subscribed_events.clear();
    session.subscribed_events.extend(kinds.iter().cloned());

    Ok(json!({ "subscribed": kinds }))
}
