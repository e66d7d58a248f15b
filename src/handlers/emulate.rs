//! `emulate/*` (spec.md §6.2 "Emulate").

use super::{engine_to_bap, page_id_param, string_param};
use crate::engine::{Geolocation, Viewport};
use crate::error::{BapError, BapResult};
use crate::session::Session;
use serde_json::{json, Value};

pub async fn set_viewport(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let width = params.get("width").and_then(Value::as_u64).ok_or_else(|| BapError::invalid_params("Missing 'width'"))? as u32;
    let height = params.get("height").and_then(Value::as_u64).ok_or_else(|| BapError::invalid_params("Missing 'height'"))? as u32;
    let state = super::page_state(session, &page_id)?;
    state.page.set_viewport_size(Viewport { width, height }).await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id, "width": width, "height": height }))
}

pub async fn set_user_agent(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let ua = string_param(&params, "userAgent")?.to_string();
    let state = super::page_state(session, &page_id)?;
    state.page.set_user_agent(&ua).await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id }))
}

pub async fn set_geolocation(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let latitude = params.get("latitude").and_then(Value::as_f64).ok_or_else(|| BapError::invalid_params("Missing 'latitude'"))?;
    let longitude = params.get("longitude").and_then(Value::as_f64).ok_or_else(|| BapError::invalid_params("Missing 'longitude'"))?;
    let accuracy = params.get("accuracy").and_then(Value::as_f64);
    let state = super::page_state(session, &page_id)?;
    state
        .page
        .set_geolocation(Geolocation { latitude, longitude, accuracy })
        .await
        .map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id }))
}

pub async fn set_offline(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let offline = params.get("offline").and_then(Value::as_bool).unwrap_or(true);
    let state = super::page_state(session, &page_id)?;
    state.page.set_offline(offline).await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id, "offline": offline }))
}
