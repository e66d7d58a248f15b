//! `dialog/handle` (spec.md §6.2 "Dialog").

use super::{engine_to_bap, page_id_param};
use crate::error::{BapError, BapResult};
use crate::session::Session;
use serde_json::{json, Value};

pub async fn handle(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let accept = params.get("accept").and_then(Value::as_bool).ok_or_else(|| BapError::invalid_params("Missing 'accept'"))?;
    let prompt_text = params.get("promptText").and_then(Value::as_str);
    let state = super::page_state(session, &page_id)?;
    state.page.handle_dialog(accept, prompt_text).await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id, "accepted": accept }))
}
