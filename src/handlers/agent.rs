//! `agent/*` (spec.md §4.8 "Agent Loop", §4.9 "agent/act", §4.10 "agent/observe").
//!
//! `agent/act` drives `act::execute_act` against a `LiveActionInvoker` that
//! delegates to `action::do_action` for the actual CDP calls and to
//! `EngineLocator`'s state queries for step conditions. `agent/observe` and
//! `agent/extract` are thin wrappers over `observe::observe_elements` and a
//! page-side extraction script respectively, grounded on the teacher's
//! `extract_page_info` (`src/page_extractor/page_info.rs`).

use super::{engine_to_bap, page_id_param};
use crate::act::{execute_act, ActOptions, ActStep, ActionInvoker, StepCondition, ConditionState, validate_steps};
use crate::annotate::{annotation_map, assign_labels, build_annotation_script, decode_screenshot_base64, AnnotationStyle, LabelFormat};
use crate::engine::EnginePage;
use crate::error::{BapError, BapResult};
use crate::observe::{observe_elements, ObserveOptions, DEFAULT_MAX_ELEMENTS};
use crate::policy::validate_selector_value;
use crate::registry::ElementRegistry;
use crate::selector::parse_selector;
use crate::session::Session;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

struct LiveActionInvoker<'a> {
    page: &'a dyn EnginePage,
    registry: &'a ElementRegistry,
}

#[async_trait]
impl ActionInvoker for LiveActionInvoker<'_> {
    async fn invoke(&self, action: &str, params: &Value) -> BapResult<Value> {
        crate::handlers::action::do_action(self.page, self.registry, action, params).await
    }

    async fn check_condition(&self, condition: &StepCondition, timeout: Duration) -> BapResult<bool> {
        let selector = parse_selector(&condition.selector).map_err(BapError::invalid_params)?;
        validate_selector_value(&selector)?;
        let css = super::resolve_to_css(&selector, self.registry)?;
        let locator = self.page.locator(&css).await.map_err(engine_to_bap)?;

        let deadline = Instant::now() + timeout;
        let mut delay = Duration::from_millis(50);
        loop {
            let satisfied = match condition.state {
                ConditionState::Visible => locator.is_visible().await.unwrap_or(false),
                ConditionState::Hidden => !locator.is_visible().await.unwrap_or(true),
                ConditionState::Enabled => locator.is_enabled().await.unwrap_or(false),
                ConditionState::Disabled => locator.is_disabled().await.unwrap_or(false),
                ConditionState::Exists => locator.count().await.unwrap_or(0) > 0,
            };
            if satisfied {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(Duration::from_millis(500));
        }
    }
}

fn act_options(params: &Value) -> ActOptions {
    let mut options = ActOptions::default();
    if let Some(ms) = params.get("timeoutMs").and_then(Value::as_u64) {
        options.timeout = Duration::from_millis(ms);
    }
    if let Some(v) = params.get("stopOnFirstError").and_then(Value::as_bool) {
        options.stop_on_first_error = v;
    }
    if let Some(v) = params.get("continueOnConditionFail").and_then(Value::as_bool) {
        options.continue_on_condition_fail = v;
    }
    options
}

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

pub async fn act(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let steps: Vec<ActStep> = serde_json::from_value(
        params.get("steps").cloned().ok_or_else(|| BapError::invalid_params("Missing 'steps'"))?,
    )
    .map_err(|e| BapError::invalid_params(format!("Invalid 'steps': {e}")))?;
    validate_steps(&steps)?;
    let options = act_options(&params);
    let pre_observe = params.get("preObserve").and_then(Value::as_bool).unwrap_or(false);
    let post_observe = params.get("postObserve").and_then(Value::as_bool).unwrap_or(false);

    let state = super::page_state_mut(session, &page_id)?;

    let before = if pre_observe {
        let obs = observe_elements(state.page.as_ref(), &mut state.registry, &ObserveOptions::default()).await?;
        Some(obs)
    } else {
        None
    };

    let invoker = LiveActionInvoker { page: state.page.as_ref(), registry: &state.registry };
    let result = execute_act(&steps, &invoker, options).await;

    let after = if post_observe {
        let obs = observe_elements(state.page.as_ref(), &mut state.registry, &ObserveOptions::default()).await?;
        Some(obs)
    } else {
        None
    };

    Ok(json!({
        "pageId": page_id,
        "result": result,
        "beforeObservation": before,
        "afterObservation": after,
    }))
}

pub async fn observe(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let annotate = params.get("annotate").and_then(Value::as_bool).unwrap_or(false);
    let options = observe_options(&params);

    let state = super::page_state_mut(session, &page_id)?;
    let elements = observe_elements(state.page.as_ref(), &mut state.registry, &options).await?;

    if !annotate {
        return Ok(json!({ "pageId": page_id, "elements": elements }));
    }

    let bytes = state.page.screenshot(false).await.map_err(engine_to_bap)?;
    let base64 = decode_screenshot_base64(&bytes);
    let max_labels = params.get("maxLabels").and_then(Value::as_u64).map(|n| n as usize).unwrap_or(crate::annotate::DEFAULT_MAX_LABELS);
    let labeled = assign_labels(&elements, max_labels, LabelFormat::Both);
    let script = build_annotation_script(&base64, &labeled, &AnnotationStyle::default(), LabelFormat::Both);
    let annotated = state.page.evaluate(&script).await.map_err(engine_to_bap)?;
    let annotated_base64 = annotated.as_str().map(str::to_string).unwrap_or(base64);

    Ok(json!({
        "pageId": page_id,
        "elements": elements,
        "image": annotated_base64,
        "annotations": annotation_map(&labeled),
    }))
}

const EXTRACT_SCRIPT: &str = r#"
(() => {
  const headings = Array.from(document.querySelectorAll('h1,h2,h3')).map(h => h.innerText.trim()).filter(Boolean).slice(0, 50);
  const links = Array.from(document.querySelectorAll('a[href]')).map(a => ({ text: a.innerText.trim(), href: a.href })).slice(0, 200);
  return {
    title: document.title,
    url: location.href,
    text: (document.body ? document.body.innerText : '').slice(0, 20000),
    headings,
    links,
  };
})()
"#;

pub async fn extract(session: &mut Session, params: Value) -> BapResult<Value> {
    let page_id = page_id_param(session, &params)?;
    let state = super::page_state(session, &page_id)?;

    if let Some(raw) = params.get("selector").and_then(Value::as_str) {
        let selector = parse_selector(raw).map_err(BapError::invalid_params)?;
        validate_selector_value(&selector)?;
        let css = super::resolve_to_css(&selector, &state.registry)?;
        let locator = state.page.locator(&css).await.map_err(engine_to_bap)?;
        let text = locator.inner_text().await.map_err(engine_to_bap)?;
        return Ok(json!({ "pageId": page_id, "text": text }));
    }

    let extracted = state.page.evaluate(EXTRACT_SCRIPT).await.map_err(engine_to_bap)?;
    Ok(json!({ "pageId": page_id, "extracted": extracted }))
}
