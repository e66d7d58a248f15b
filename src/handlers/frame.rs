//! `frame/*` (spec.md §6.2 "Frame").
//!
//! The shipped engine has no per-frame evaluation context (see
//! `engine::EnginePage::frames`'s doc note); `current_frame` is tracked on
//! `PageState` for forward compatibility but `action/*`/`observe/*` always
//! operate against the page's main world today.

use super::page_id_param;
use crate::error::{BapError, BapResult};
use crate::session::Session;
use serde_json::{json, Value};

pub async fn list(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let frames = state.page.frames().await.map_err(super::engine_to_bap)?;
    Ok(json!({ "frames": frames, "current": state.current_frame }))
}

pub fn switch(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let frame_id = params
        .get("frameId")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'frameId'"))?
        .to_string();
    let state = super::page_state_mut(session, &page_id)?;
    state.current_frame = Some(frame_id.clone());
    Ok(json!({ "pageId": page_id, "frameId": frame_id }))
}

pub fn main_frame(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state_mut(session, &page_id)?;
    state.current_frame = None;
    Ok(json!({ "pageId": page_id }))
}
