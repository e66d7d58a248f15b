//! End-to-end coverage of the policy chain and the `action/*`/`agent/*`
//! handler families against a seeded fake page, bypassing the real
//! `chromiumoxide` engine (see `tests/support/fake_engine.rs` for why
//! `browser/launch`/`context/create`/`page/create` aren't exercised here).

mod support;

use bap_server::config::Config;
use bap_server::dispatcher;
use bap_server::registry::ElementRegistry;
use bap_server::session::{PageState, SessionManager};
use serde_json::json;
use std::collections::HashSet;
use std::time::Instant;
use support::fake_engine::{FakeElementState, FakePage};

fn manager() -> std::sync::Arc<SessionManager> {
    std::sync::Arc::new(SessionManager::new(10, std::time::Duration::from_secs(3600), std::time::Duration::from_secs(600)))
}

/// Build a session with a single seeded page, bypassing `browser/launch` ->
/// `context/create` -> `page/create` (see module doc).
async fn session_with_page(
    page: FakePage,
) -> (
    std::sync::Arc<tokio::sync::Mutex<bap_server::session::Session>>,
    tokio::sync::mpsc::UnboundedReceiver<bap_server::session::OutboundMessage>,
) {
    let mgr = manager();
    let (session, rx, _close_rx) = mgr.create_session(HashSet::from(["*".to_string()]), Instant::now());
    {
        let mut guard = session.lock().await;
        guard.initialized = true;
        guard.pages.insert(
            "page_1".to_string(),
            PageState { page: Box::new(page), context_name: "ctx_1".to_string(), registry: ElementRegistry::new(), current_frame: None },
        );
        guard.active_page_id = Some("page_1".to_string());
    }
    (session, rx)
}

#[tokio::test]
async fn action_click_succeeds_against_present_element() {
    let page = FakePage::new("https://example.test");
    page.set_element("#submit", FakeElementState::present());
    let (session, _rx) = session_with_page(page).await;
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let result = dispatcher::handle_request(
        &mut guard,
        &config,
        json!(1),
        "action/click",
        Some(json!({ "selector": "css:#submit" })),
    )
    .await;

    assert!(result.contains("\"result\""), "unexpected response: {result}");
}

#[tokio::test]
async fn action_click_on_missing_element_returns_timeout() {
    let page = FakePage::new("https://example.test");
    page.set_element("#ghost", FakeElementState::absent());
    let (session, _rx) = session_with_page(page).await;
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let result = dispatcher::handle_request(
        &mut guard,
        &config,
        json!(1),
        "action/click",
        Some(json!({ "selector": "css:#ghost" })),
    )
    .await;

    assert!(result.contains(&bap_server::error::ErrorCode::Timeout.code().to_string()));
}

#[tokio::test]
async fn action_click_on_hidden_element_returns_not_visible() {
    let page = FakePage::new("https://example.test");
    page.set_element("#hidden", FakeElementState::hidden());
    let (session, _rx) = session_with_page(page).await;
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let result = dispatcher::handle_request(
        &mut guard,
        &config,
        json!(1),
        "action/click",
        Some(json!({ "selector": "css:#hidden" })),
    )
    .await;

    assert!(result.contains(&bap_server::error::ErrorCode::ElementNotVisible.code().to_string()));
}

#[tokio::test]
async fn action_fill_then_extract_round_trips_through_fake_locator() {
    let page = FakePage::new("https://example.test");
    page.set_element("#search", FakeElementState::present());
    let (session, _rx) = session_with_page(page).await;
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let fill = dispatcher::handle_request(
        &mut guard,
        &config,
        json!(1),
        "action/fill",
        Some(json!({ "selector": "css:#search", "value": "rust" })),
    )
    .await;
    assert!(fill.contains("\"result\""), "fill failed: {fill}");

    let extract = dispatcher::handle_request(
        &mut guard,
        &config,
        json!(2),
        "agent/extract",
        Some(json!({ "selector": "css:#search" })),
    )
    .await;
    assert!(extract.contains("\"result\""), "extract failed: {extract}");
}

#[tokio::test]
async fn page_list_reports_seeded_page_as_active() {
    let page = FakePage::new("https://example.test/start");
    let (session, _rx) = session_with_page(page).await;
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let result = dispatcher::handle_request(&mut guard, &config, json!(1), "page/list", None).await;

    assert!(result.contains("page_1"));
    assert!(result.contains("\"active\":true"));
    assert!(result.contains("https://example.test/start"));
}

#[tokio::test]
async fn agent_observe_surfaces_fake_evaluate_payload() {
    let page = FakePage::new("https://example.test");
    page.set_observed_elements(json!([
        {
            "role": "button",
            "accessibleName": "Submit",
            "value": null,
            "tagName": "button",
            "focused": false,
            "disabled": false,
            "testId": "submit-btn",
            "domId": null,
            "nameAttr": null,
            "ariaLabel": null,
            "parentRole": "form",
            "siblingIndex": 0,
            "cssPath": "form > button:nth-of-type(1)",
            "bounds": [0.0, 0.0, 80.0, 20.0],
        }
    ]));
    let (session, _rx) = session_with_page(page).await;
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let result = dispatcher::handle_request(&mut guard, &config, json!(1), "agent/observe", Some(json!({}))).await;

    assert!(result.contains("testId:submit-btn") || result.contains("\"refId\""), "unexpected response: {result}");
    assert!(result.contains("\"role\":\"button\""));
}

#[tokio::test]
async fn agent_act_runs_fill_then_click_sequence() {
    let page = FakePage::new("https://example.test");
    page.set_element("#email", FakeElementState::present());
    page.set_element("#go", FakeElementState::present());
    let (session, _rx) = session_with_page(page).await;
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let steps = json!([
        { "action": "fill", "params": { "selector": "css:#email", "value": "a@b.test" } },
        { "action": "click", "params": { "selector": "css:#go" } },
    ]);
    let result = dispatcher::handle_request(
        &mut guard,
        &config,
        json!(1),
        "agent/act",
        Some(json!({ "steps": steps })),
    )
    .await;

    assert!(result.contains("\"success\":true"), "unexpected response: {result}");
    assert!(result.contains("\"completed\":2"));
}

#[tokio::test]
async fn uninitialized_session_is_rejected_before_touching_the_page() {
    let page = FakePage::new("https://example.test");
    let mgr = manager();
    let (session, _rx, _close_rx) = mgr.create_session(HashSet::from(["*".to_string()]), Instant::now());
    {
        let mut guard = session.lock().await;
        guard.pages.insert(
            "page_1".to_string(),
            PageState { page: Box::new(page), context_name: "ctx_1".to_string(), registry: ElementRegistry::new(), current_frame: None },
        );
        guard.active_page_id = Some("page_1".to_string());
    }
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let result = dispatcher::handle_request(
        &mut guard,
        &config,
        json!(1),
        "action/click",
        Some(json!({ "selector": "css:#go" })),
    )
    .await;

    assert!(result.contains(&bap_server::error::ErrorCode::NotInitialized.code().to_string()));
}

#[tokio::test]
async fn missing_scope_rejects_request_before_handler_runs() {
    let page = FakePage::new("https://example.test");
    let mgr = manager();
    let (session, _rx, _close_rx) = mgr.create_session(HashSet::new(), Instant::now());
    {
        let mut guard = session.lock().await;
        guard.initialized = true;
        guard.pages.insert(
            "page_1".to_string(),
            PageState { page: Box::new(page), context_name: "ctx_1".to_string(), registry: ElementRegistry::new(), current_frame: None },
        );
        guard.active_page_id = Some("page_1".to_string());
    }
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let result = dispatcher::handle_request(
        &mut guard,
        &config,
        json!(1),
        "action/click",
        Some(json!({ "selector": "css:#go" })),
    )
    .await;

    assert!(result.contains(&bap_server::error::ErrorCode::Unauthorized.code().to_string()));
}

#[tokio::test]
async fn frame_list_reflects_fake_page_frames() {
    let page = FakePage::new("https://example.test");
    let (session, _rx) = session_with_page(page).await;
    let config = Config::from_env();

    let mut guard = session.lock().await;
    let result = dispatcher::handle_request(&mut guard, &config, json!(1), "frame/list", Some(json!({}))).await;

    assert!(result.contains("\"main\""));
}
