//! `storage/*` (spec.md §6.2 "Storage").

use super::{engine_to_bap, page_id_param};
use crate::audit::{record, AuditEvent};
use crate::error::BapResult;
use crate::session::Session;
use serde_json::{json, Value};

pub async fn get_state(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let storage_state = state.page.storage_state().await.map_err(engine_to_bap)?;
    record(AuditEvent::StorageStateExtracted, json!({ "pageId": page_id }));
    Ok(json!({ "pageId": page_id, "state": storage_state }))
}

pub async fn set_state(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let storage_state = params.get("state").cloned().unwrap_or(Value::Null);
    let state = super::page_state(session, &page_id)?;
    state.page.set_storage_state(storage_state).await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id }))
}

pub async fn get_cookies(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let cookies = state.page.cookies().await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id, "cookies": cookies }))
}

pub async fn set_cookies(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let cookies = params.get("cookies").cloned().unwrap_or(Value::Array(vec![]));
    let state = super::page_state(session, &page_id)?;
    state.page.set_cookies(cookies).await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id }))
}

pub async fn clear_cookies(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    state.page.clear_cookies().await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id }))
}
