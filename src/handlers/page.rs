//! `page/*` (spec.md §6.2 "Page").

use super::page_id_param;
use crate::engine::ChromiumoxideEngine;
use crate::error::{BapError, BapResult, ErrorCode};
use crate::observe::{observe_elements, ObserveOptions, DEFAULT_MAX_ELEMENTS};
use crate::policy::{validate_navigation_url, UrlGuardConfig};
use crate::registry::ElementRegistry;
use crate::session::{PageState, Session, DEFAULT_MAX_PAGES_PER_CLIENT};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// `page/navigate`'s optional `observe` fusion reuses the same
/// `maxElements`/`filterRoles` knobs `agent/observe` takes (spec.md §4.9).
fn observe_options(params: &Value) -> ObserveOptions {
    ObserveOptions {
        refresh_refs: true,
        report_history: false,
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

fn nav_timeout(params: &Value) -> Duration {
    params
        .get("timeoutMs")
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

pub async fn create(session: &mut Session, params: Value) -> BapResult<Value> {
    if session.pages.len() >= DEFAULT_MAX_PAGES_PER_CLIENT {
        return Err(BapError::new(ErrorCode::ResourceLimitExceeded, "Maximum number of pages reached"));
    }

    let context_id = params
        .get("contextId")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'contextId'"))?
        .to_string();

    let browser = session
        .browser
        .as_ref()
        .ok_or_else(|| BapError::new(ErrorCode::BrowserNotLaunched, "No browser launched"))?;

    let opts = session
        .contexts
        .get(&context_id)
        .ok_or_else(|| BapError::new(ErrorCode::ContextNotFound, format!("Unknown context: {context_id}")))?
        .opts
        .clone();

    let page = ChromiumoxideEngine::new_page_in(browser.as_ref(), &opts)
        .await
        .map_err(|e| BapError::from_engine_message(&e.to_string()))?;

    if let Some(url) = params.get("url").and_then(Value::as_str) {
        validate_navigation_url(url, &UrlGuardConfig::default())?;
        page.goto(url, nav_timeout(&params))
            .await
            .map_err(|e| BapError::from_engine_message(&e.to_string()))?;
    }

    let page_id = format!("page_{}", Uuid::new_v4());
    session.pages.insert(
        page_id.clone(),
        PageState { page, context_name: context_id.clone(), registry: ElementRegistry::new(), current_frame: None },
    );
    if let Some(ctx) = session.contexts.get_mut(&context_id) {
        ctx.pages.insert(page_id.clone(), page_id.clone());
    }
    session.active_page_id = Some(page_id.clone());

    Ok(json!({ "pageId": page_id }))
}

pub async fn navigate(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let url = params
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'url'"))?
        .to_string();
    validate_navigation_url(&url, &UrlGuardConfig::default())?;

    let state = super::page_state_mut(session, &page_id)?;
    state
        .page
        .goto(&url, nav_timeout(&params))
        .await
        .map_err(|e| BapError::from_engine_message(&e.to_string()))?;

    // The old page's refs are meaningless once navigation lands on a new
    // document; reset immediately rather than waiting for the next
    // `observe/*` call (spec.md §4.8 Testable Property #4).
    state.registry.begin_observation(&url, true, Instant::now());

    let observe = params.get("observe").and_then(Value::as_bool).unwrap_or(false);
    let observation = if observe {
        let options = observe_options(&params);
        Some(observe_elements(state.page.as_ref(), &mut state.registry, &options).await?)
    } else {
        None
    };

    Ok(json!({ "pageId": page_id, "url": url, "elements": observation }))
}

pub async fn reload(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    state
        .page
        .reload(nav_timeout(&params))
        .await
        .map_err(|e| BapError::from_engine_message(&e.to_string()))?;
    Ok(json!({ "pageId": page_id }))
}

pub async fn go_back(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let navigated = state
        .page
        .go_back(nav_timeout(&params))
        .await
        .map_err(|e| BapError::from_engine_message(&e.to_string()))?;
    Ok(json!({ "pageId": page_id, "navigated": navigated }))
}

pub async fn go_forward(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    let navigated = state
        .page
        .go_forward(nav_timeout(&params))
        .await
        .map_err(|e| BapError::from_engine_message(&e.to_string()))?;
    Ok(json!({ "pageId": page_id, "navigated": navigated }))
}

pub async fn close(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = session
        .pages
        .remove(&page_id)
        .ok_or_else(|| BapError::new(ErrorCode::ContextNotFound, format!("Unknown page: {page_id}")))?;
    let _ = state.page.close().await;
    if let Some(ctx) = session.contexts.get_mut(&state.context_name) {
        ctx.pages.remove(&page_id);
    }
    if session.active_page_id.as_deref() == Some(page_id.as_str()) {
        session.active_page_id = None;
    }
    Ok(json!({ "closed": true }))
}

pub async fn list(session: &mut Session) -> BapResult<Value> {
    let mut pages = Vec::with_capacity(session.pages.len());
    for (id, state) in session.pages.iter() {
        let url = state.page.url().await.unwrap_or_default();
        pages.push(json!({
            "pageId": id,
            "contextId": state.context_name,
            "url": url,
            "active": session.active_page_id.as_deref() == Some(id.as_str()),
        }));
    }
    Ok(json!({ "pages": pages }))
}

pub fn activate(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = params
        .get("pageId")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'pageId'"))?
        .to_string();
    if !session.pages.contains_key(&page_id) {
        return Err(BapError::new(ErrorCode::ContextNotFound, format!("Unknown page: {page_id}")));
    }
    session.active_page_id = Some(page_id.clone());
    Ok(json!({ "pageId": page_id, "active": true }))
}
