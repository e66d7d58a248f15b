//! `observe/*` (spec.md §6.2 "Observe", §4.10).

use super::{engine_to_bap, locate, page_id_param};
use crate::annotate::{annotation_map, assign_labels, build_annotation_script, decode_screenshot_base64, AnnotationStyle, LabelFormat};
use crate::error::BapResult;
use crate::observe::{observe_elements, ObserveOptions, DEFAULT_MAX_ELEMENTS};
use crate::policy::{is_sensitive_element, redact_html};
use crate::rate_limit::SCREENSHOTS;
use crate::session::Session;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Instant;

fn observe_options(params: &Value) -> ObserveOptions {
    ObserveOptions {
        refresh_refs: params.get("refreshRefs").and_then(Value::as_bool).unwrap_or(false),
        report_history: params.get("reportHistory").and_then(Value::as_bool).unwrap_or(false),
        filter_roles: params
            .get("filterRoles")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
        max_elements: params
            .get("maxElements")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_ELEMENTS),
    }
}

pub async fn screenshot(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    session.rate_limiter.check_and_increment(SCREENSHOTS, Instant::now())?;

    let full_page = params.get("fullPage").and_then(Value::as_bool).unwrap_or(false);
    let annotate = params.get("annotate").and_then(Value::as_bool).unwrap_or(false);

    let state = super::page_state_mut(session, &page_id)?;
    let bytes = state.page.screenshot(full_page).await.map_err(engine_to_bap)?;
    let base64 = decode_screenshot_base64(&bytes);

    if !annotate {
        return Ok(json!({ "pageId": page_id, "image": base64, "format": "png" }));
    }

    let options = observe_options(&params);
    let elements = observe_elements(state.page.as_ref(), &mut state.registry, &options).await?;
    let max_labels = params.get("maxLabels").and_then(Value::as_u64).map(|n| n as usize).unwrap_or(crate::annotate::DEFAULT_MAX_LABELS);
    let format = match params.get("labelFormat").and_then(Value::as_str) {
        Some("ref") => LabelFormat::Ref,
        Some("both") => LabelFormat::Both,
        _ => LabelFormat::Number,
    };
    let labeled = assign_labels(&elements, max_labels, format);
    let script = build_annotation_script(&base64, &labeled, &AnnotationStyle::default(), format);
    let annotated = state.page.evaluate(&script).await.map_err(engine_to_bap)?;
    let annotated_base64 = annotated.as_str().map(str::to_string).unwrap_or(base64);

    Ok(json!({
        "pageId": page_id,
        "image": annotated_base64,
        "format": "png",
        "annotations": annotation_map(&labeled),
    }))
}

pub async fn accessibility(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let options = observe_options(&params);
    let state = super::page_state_mut(session, &page_id)?;
    let elements = observe_elements(state.page.as_ref(), &mut state.registry, &options).await?;
    Ok(json!({ "pageId": page_id, "elements": elements }))
}

pub async fn dom(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let html = state.page.content().await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id, "html": redact_html(&html) }))
}

pub async fn element(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let locator = locate(state.page.as_ref(), &state.registry, &params).await?;

    let bounds = locator.bounding_box().await.map_err(engine_to_bap)?;
    let visible = locator.is_visible().await.map_err(engine_to_bap)?;
    let enabled = locator.is_enabled().await.map_err(engine_to_bap)?;
    let checked = locator.is_checked().await.unwrap_or(false);
    let text = locator.inner_text().await.unwrap_or_default();
    let count = locator.count().await.map_err(engine_to_bap)?;

    let input_type = locator.get_attribute("type").await.unwrap_or(None);
    let has_data_sensitive = locator.get_attribute("data-sensitive").await.unwrap_or(None).is_some();
    let value = if is_sensitive_element("input", input_type.as_deref(), has_data_sensitive) {
        "[REDACTED]".to_string()
    } else {
        locator.input_value().await.unwrap_or_default()
    };

    Ok(json!({
        "pageId": page_id,
        "bounds": bounds,
        "visible": visible,
        "enabled": enabled,
        "checked": checked,
        "text": text,
        "value": value,
        "matchCount": count,
    }))
}

pub async fn pdf(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let bytes = state.page.pdf().await.map_err(engine_to_bap)?;
    Ok(json!({
        "pageId": page_id,
        "data": base64::engine::general_purpose::STANDARD.encode(bytes),
    }))
}

pub async fn content(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let text = state
        .page
        .evaluate("document.body ? document.body.innerText : ''")
        .await
        .map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id, "text": text.as_str().unwrap_or_default() }))
}

pub async fn aria_snapshot(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let locator = locate(state.page.as_ref(), &state.registry, &params).await?;
    let snapshot = locator.aria_snapshot().await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id, "snapshot": snapshot }))
}
