//! `action/*` (spec.md §6.2 "Action") and the shared `do_action` dispatcher
//! `agent::act`'s `ActionInvoker` reuses for composite step execution.
//!
//! Grounded on the teacher's `tools/click.rs` / `tools/type_text.rs` /
//! `tools/scroll.rs` for the per-action CDP calls; generalized here from one
//! action per tool file into a single closed action-name match.

use super::{action_timeout, engine_to_bap, locate, page_id_param, string_array_param, string_param};
use crate::engine::EnginePage;
use crate::error::{BapError, BapResult};
use crate::policy::{validate_navigation_url, UrlGuardConfig};
use crate::registry::ElementRegistry;
use crate::session::Session;
use serde_json::{json, Value};

pub async fn dispatch_action(session: &mut Session, action: &str, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;
    do_action(state.page.as_ref(), &state.registry, action, &params).await
}

/// Execute one named action against `page`, resolving its `selector` param
/// through `registry`. Shared by the direct `action/*` handlers and by
/// `agent/act`'s step loop (`handlers::agent::LiveActionInvoker`).
pub async fn do_action(
    page: &dyn EnginePage,
    registry: &ElementRegistry,
    action: &str,
    params: &Value,
) -> BapResult<Value> {
    let timeout = action_timeout(params);

    // `agent/act` steps may name a page-level navigation action rather than
    // an element-targeted one; these have no `selector` and never reach the
    // wire as `action/*` methods (the dispatcher's `action/*` arm only ever
    // passes element actions here).
    match action {
        "page/navigate" => {
            let url = string_param(params, "url")?;
            validate_navigation_url(url, &UrlGuardConfig::default())?;
            page.goto(url, timeout).await.map_err(engine_to_bap)?;
            return Ok(json!({ "url": url }));
        }
        "page/reload" => {
            page.reload(timeout).await.map_err(engine_to_bap)?;
            return Ok(json!({}));
        }
        "page/goBack" => {
            let navigated = page.go_back(timeout).await.map_err(engine_to_bap)?;
            return Ok(json!({ "navigated": navigated }));
        }
        "page/goForward" => {
            let navigated = page.go_forward(timeout).await.map_err(engine_to_bap)?;
            return Ok(json!({ "navigated": navigated }));
        }
        _ => {}
    }

    let locator = locate(page, registry, params).await?;
    match action {
        "click" => locator.click(timeout).await.map(|_| json!({})),
        "dblclick" => locator.dblclick(timeout).await.map(|_| json!({})),
        "fill" => {
            let value = string_param(params, "value")?;
            locator.fill(value, timeout).await.map(|_| json!({}))
        }
        "type" => {
            let value = string_param(params, "value")?;
            locator.type_sequentially(value, timeout).await.map(|_| json!({}))
        }
        "press" => {
            let key = string_param(params, "key")?;
            locator.press(key, timeout).await.map(|_| json!({}))
        }
        "hover" => locator.hover(timeout).await.map(|_| json!({})),
        "scroll" => locator.scroll_into_view_if_needed().await.map(|_| json!({})),
        "select" => {
            let values = string_array_param(params, "values")?;
            locator.select_option(&values, timeout).await.map(|_| json!({}))
        }
        "check" => locator.check(timeout).await.map(|_| json!({})),
        "uncheck" => locator.uncheck(timeout).await.map(|_| json!({})),
        "clear" => locator.clear(timeout).await.map(|_| json!({})),
        "upload" => {
            let files = string_array_param(params, "files")?;
            locator.set_input_files(&files, timeout).await.map(|_| json!({}))
        }
        "drag" => {
            let target_raw = string_param(params, "targetSelector")?;
            let target_sel = crate::selector::parse_selector(target_raw)
                .map_err(crate::error::BapError::invalid_params)?;
            crate::policy::validate_selector_value(&target_sel)?;
            let target_css = super::resolve_to_css(&target_sel, registry)?;
            let target_locator = page.locator(&target_css).await.map_err(engine_to_bap)?;
            locator.drag_to(target_locator.as_ref(), timeout).await.map(|_| json!({}))
        }
        other => return Err(crate::error::BapError::invalid_params(format!("Unknown action: {other}"))),
    }
    .map_err(engine_to_bap)
}
