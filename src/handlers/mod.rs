//! Method handlers (spec.md §6.2). Each submodule covers one method family;
//! `dispatch` is the single entry point the dispatcher calls after the
//! policy pre-checks have passed.
//!
//! Grounded on the teacher's `tools/*.rs` one-file-per-tool layout, adapted
//! from MCP tool functions (`Tool::call(args) -> CallToolResult`) to plain
//! `Session`-mutating handlers since BAP has no separate tool-schema layer.

mod action;
mod agent;
mod approval_handler;
mod browser;
mod context;
mod dialog;
mod emulate;
mod events_handler;
mod frame;
mod lifecycle;
mod network;
mod observe_handler;
mod page;
mod storage;
mod stream_handler;
mod trace;

use crate::config::Config;
use crate::engine::{EngineError, EngineLocator};
use crate::error::{BapError, BapResult, ErrorCode};
use crate::registry::ElementRegistry;
use crate::selector::{parse_selector, Selector};
use crate::session::{PageState, Session};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Route one already-authorized request to its handler.
pub async fn dispatch(session: &mut Session, config: &Config, method: &str, params: Value) -> BapResult<Value> {
    match method {
        "initialize" => lifecycle::initialize(session, params),
        "shutdown" => lifecycle::shutdown(session).await,

        "browser/launch" => browser::launch(session, config, params).await,
        "browser/close" => browser::close(session).await,

        "context/create" => context::create(session, params).await,
        "context/list" => context::list(session),
        "context/destroy" => context::destroy(session, params).await,

        "page/create" => page::create(session, params).await,
        "page/navigate" => page::navigate(session, params).await,
        "page/reload" => page::reload(session, params).await,
        "page/goBack" => page::go_back(session, params).await,
        "page/goForward" => page::go_forward(session, params).await,
        "page/close" => page::close(session, params).await,
        "page/list" => page::list(session).await,
        "page/activate" => page::activate(session, params),

        "frame/list" => frame::list(session, params).await,
        "frame/switch" => frame::switch(session, params),
        "frame/main" => frame::main_frame(session, params),

        "action/click" | "action/dblclick" | "action/fill" | "action/clear" | "action/type"
        | "action/press" | "action/hover" | "action/scroll" | "action/select" | "action/check"
        | "action/uncheck" | "action/upload" | "action/drag" => {
            let action = method.strip_prefix("action/").expect("matched action/ prefix");
            action::dispatch_action(session, action, params).await
        }

        "observe/screenshot" => observe_handler::screenshot(session, params).await,
        "observe/accessibility" => observe_handler::accessibility(session, params).await,
        "observe/dom" => observe_handler::dom(session, params).await,
        "observe/element" => observe_handler::element(session, params).await,
        "observe/pdf" => observe_handler::pdf(session, params).await,
        "observe/content" => observe_handler::content(session, params).await,
        "observe/ariaSnapshot" => observe_handler::aria_snapshot(session, params).await,

        "storage/getState" => storage::get_state(session, params).await,
        "storage/setState" => storage::set_state(session, params).await,
        "storage/getCookies" => storage::get_cookies(session, params).await,
        "storage/setCookies" => storage::set_cookies(session, params).await,
        "storage/clearCookies" => storage::clear_cookies(session, params).await,

        "network/intercept" => network::intercept(session, params),
        "network/fulfill" => network::fulfill(session, params),
        "network/abort" => network::abort(session, params),
        "network/continue" => network::continue_request(session, params),

        "emulate/setViewport" => emulate::set_viewport(session, params).await,
        "emulate/setUserAgent" => emulate::set_user_agent(session, params).await,
        "emulate/setGeolocation" => emulate::set_geolocation(session, params).await,
        "emulate/setOffline" => emulate::set_offline(session, params).await,

        "dialog/handle" => dialog::handle(session, params).await,

        "trace/start" => trace::start(session, params),
        "trace/stop" => trace::stop(session),

        "events/subscribe" => events_handler::subscribe(session, params),
        "stream/cancel" => stream_handler::cancel(session, params),
        "approval/respond" => approval_handler::respond(session, params),

        "agent/act" => agent::act(session, params).await,
        "agent/observe" => agent::observe(session, params).await,
        "agent/extract" => agent::extract(session, params).await,

        other => Err(BapError::method_not_found(other)),
    }
}

pub(crate) fn page_id_param(session: &Session, params: &Value) -> BapResult<String> {
    if let Some(id) = params.get("pageId").and_then(Value::as_str) {
        return Ok(id.to_string());
    }
    session
        .active_page_id
        .clone()
        .ok_or_else(|| BapError::new(ErrorCode::BrowserNotLaunched, "No active page; call page/create or page/activate first"))
}

pub(crate) fn page_state<'a>(session: &'a Session, page_id: &str) -> BapResult<&'a PageState> {
    session
        .pages
        .get(page_id)
        .ok_or_else(|| BapError::new(ErrorCode::ContextNotFound, format!("Unknown page: {page_id}")))
}

pub(crate) fn page_state_mut<'a>(session: &'a mut Session, page_id: &str) -> BapResult<&'a mut PageState> {
    session
        .pages
        .get_mut(page_id)
        .ok_or_else(|| BapError::new(ErrorCode::ContextNotFound, format!("Unknown page: {page_id}")))
}

pub(crate) fn active_page<'a>(session: &'a Session, params: &Value) -> BapResult<(&'a PageState, String)> {
    let id = page_id_param(session, params)?;
    let state = page_state(session, &id)?;
    Ok((state, id))
}

pub(crate) fn engine_to_bap(e: EngineError) -> BapError {
    BapError::from_engine_message(&e.to_string())
}

pub(crate) fn action_timeout(params: &Value) -> Duration {
    params
        .get("timeoutMs")
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_ACTION_TIMEOUT)
}

pub(crate) fn string_param<'a>(params: &'a Value, name: &str) -> BapResult<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| BapError::invalid_params(format!("Missing '{name}'")))
}

pub(crate) fn string_array_param(params: &Value, name: &str) -> BapResult<Vec<String>> {
    params
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| BapError::invalid_params(format!("Missing '{name}'")))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| BapError::invalid_params(format!("'{name}' must be an array of strings")))
        })
        .collect()
}

pub(crate) fn parsed_selector(params: &Value) -> BapResult<Selector> {
    let raw = string_param(params, "selector")?;
    parse_selector(raw).map_err(BapError::invalid_params)
}

/// Translate a BAP `Selector` into the CSS string `chromiumoxide`'s
/// `find_element` understands. The concrete engine has no accessibility-tree
/// query support, so role/text/label/placeholder selectors are approximated
/// as attribute selectors rather than matched against the computed
/// accessible name — a documented simplification (see DESIGN.md).
pub(crate) fn resolve_to_css(sel: &Selector, registry: &ElementRegistry) -> BapResult<String> {
    match sel {
        Selector::Css { value } => Ok(value.clone()),
        Selector::Xpath { value } => Ok(value.clone()),
        Selector::TestId { value } => Ok(format!(r#"[data-testid="{value}"],[data-test-id="{value}"]"#)),
        Selector::Label { value } => Ok(format!(r#"[aria-label="{value}"]"#)),
        Selector::Placeholder { value } => Ok(format!(r#"[placeholder="{value}"]"#)),
        Selector::Role { role, name, .. } => match name {
            Some(n) => Ok(format!(r#"[role="{role}"][aria-label="{n}"]"#)),
            None => Ok(format!(r#"[role="{role}"]"#)),
        },
        Selector::Text { value, .. } => Ok(format!(r#"[aria-label="{value}"]"#)),
        Selector::Semantic { .. } => resolve_to_css(&sel.resolved_for_engine(), registry),
        Selector::Coordinates { .. } => Err(BapError::invalid_params(
            "Coordinate selectors are not resolvable to an element; use observe/element bounds and act directly on the page",
        )),
        Selector::Ref { ref_id } => {
            let entry = registry
                .resolve(ref_id)
                .ok_or_else(|| BapError::element_not_found(ref_id))?;
            let parsed = parse_selector(&entry.selector).map_err(BapError::invalid_params)?;
            resolve_to_css(&parsed, registry)
        }
    }
}

pub(crate) async fn locate(
    page: &dyn crate::engine::EnginePage,
    registry: &ElementRegistry,
    params: &Value,
) -> BapResult<Box<dyn EngineLocator>> {
    let sel = parsed_selector(params)?;
    crate::policy::validate_selector_value(&sel)?;
    let css = resolve_to_css(&sel, registry)?;
    page.locator(&css).await.map_err(engine_to_bap)
}
