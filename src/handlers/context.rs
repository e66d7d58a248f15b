//! `context/create` / `context/list` / `context/destroy` (spec.md §6.2 "Context").

use crate::engine::ContextOptions;
use crate::error::{BapError, BapResult, ErrorCode};
use crate::session::{ContextState, Session, DEFAULT_MAX_CONTEXTS};
use serde_json::{json, Value};
use uuid::Uuid;

fn parse_context_options(params: &Value) -> ContextOptions {
    serde_json::from_value(params.clone()).unwrap_or_default()
}

pub async fn create(session: &mut Session, params: Value) -> BapResult<Value> {
    let browser = session
        .browser
        .as_ref()
        .ok_or_else(|| BapError::new(ErrorCode::BrowserNotLaunched, "No browser launched; call browser/launch first"))?;

    if session.contexts.len() >= DEFAULT_MAX_CONTEXTS {
        return Err(BapError::new(ErrorCode::ResourceLimitExceeded, "Maximum number of contexts reached"));
    }

    let opts = parse_context_options(&params);
    let context = browser
        .new_context(opts.clone())
        .await
        .map_err(|e| BapError::from_engine_message(&e.to_string()))?;

    let context_id = format!("ctx_{}", Uuid::new_v4());
    session.contexts.insert(context_id.clone(), ContextState { context, opts, pages: std::collections::HashMap::new() });

    Ok(json!({ "contextId": context_id }))
}

pub fn list(session: &mut Session) -> BapResult<Value> {
    let contexts: Vec<Value> = session
        .contexts
        .iter()
        .map(|(id, ctx)| json!({ "contextId": id, "pageCount": ctx.pages.len() }))
        .collect();
    Ok(json!({ "contexts": contexts }))
}

pub async fn destroy(session: &mut Session, params: Value) -> BapResult<Value> {
    let context_id = params
        .get("contextId")
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params("Missing 'contextId'"))?;

    let context = session
        .contexts
        .remove(context_id)
        .ok_or_else(|| BapError::new(ErrorCode::ContextNotFound, format!("Unknown context: {context_id}")))?;

    let page_ids: Vec<String> = context.pages.values().cloned().collect();
    for page_id in page_ids {
        if let Some(page) = session.pages.remove(&page_id) {
            let _ = page.page.close().await;
        }
        if session.active_page_id.as_deref() == Some(page_id.as_str()) {
            session.active_page_id = None;
        }
    }
    let _ = context.context.close().await;

    Ok(json!({ "destroyed": true }))
}
