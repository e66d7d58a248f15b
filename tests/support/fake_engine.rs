//! In-memory `EnginePage`/`EngineLocator` pair for integration tests.
//!
//! `page/create` binds directly to `ChromiumoxideEngine::new_page_in`
//! rather than going through `EngineContext::new_page` (see that trait's
//! module doc), so browser/context/page creation itself isn't fakeable
//! end-to-end. Tests instead seed a `PageState` wrapping `FakePage`
//! directly into a `Session`, then exercise everything downstream of page
//! creation — `action/*`, `observe/*`, `frame/*`, `agent/*` — through the
//! real dispatcher.

use async_trait::async_trait;
use bap_server::engine::{EngineError, EngineLocator, EnginePage, EngineResult, Geolocation, Viewport};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeElementState {
    pub count: usize,
    pub visible: bool,
    pub enabled: bool,
    pub checked: bool,
    pub text: String,
    pub value: String,
}

impl FakeElementState {
    pub fn present() -> Self {
        Self { count: 1, visible: true, enabled: true, checked: false, text: String::new(), value: String::new() }
    }

    pub fn absent() -> Self {
        Self { count: 0, visible: false, enabled: false, checked: false, text: String::new(), value: String::new() }
    }

    pub fn hidden() -> Self {
        Self { visible: false, ..Self::present() }
    }
}

struct Shared {
    url: Mutex<String>,
    title: Mutex<String>,
    elements: Mutex<HashMap<String, FakeElementState>>,
    click_counts: Mutex<HashMap<String, usize>>,
    observed_elements: Mutex<Value>,
}

pub struct FakePage {
    shared: Arc<Shared>,
}

impl FakePage {
    pub fn new(start_url: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: Mutex::new(start_url.to_string()),
                title: Mutex::new(String::new()),
                elements: Mutex::new(HashMap::new()),
                click_counts: Mutex::new(HashMap::new()),
                observed_elements: Mutex::new(json!([])),
            }),
        }
    }

    pub fn set_element(&self, selector: &str, state: FakeElementState) {
        self.shared.elements.lock().unwrap().insert(selector.to_string(), state);
    }

    /// Configure the payload `evaluate` returns for the fixed interactive-element
    /// enumerator script (spec.md §4.10), shaped like `ObservedElement`.
    pub fn set_observed_elements(&self, elements: Value) {
        *self.shared.observed_elements.lock().unwrap() = elements;
    }

    pub fn click_count(&self, selector: &str) -> usize {
        *self.shared.click_counts.lock().unwrap().get(selector).unwrap_or(&0)
    }

    fn state_for(&self, selector: &str) -> FakeElementState {
        self.shared.elements.lock().unwrap().get(selector).cloned().unwrap_or_else(FakeElementState::present)
    }
}

#[async_trait]
impl EnginePage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> EngineResult<()> {
        *self.shared.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> EngineResult<()> {
        Ok(())
    }

    async fn go_back(&self, _timeout: Duration) -> EngineResult<bool> {
        Ok(true)
    }

    async fn go_forward(&self, _timeout: Duration) -> EngineResult<bool> {
        Ok(true)
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn url(&self) -> EngineResult<String> {
        Ok(self.shared.url.lock().unwrap().clone())
    }

    async fn title(&self) -> EngineResult<String> {
        Ok(self.shared.title.lock().unwrap().clone())
    }

    async fn viewport_size(&self) -> EngineResult<Viewport> {
        Ok(Viewport { width: 1280, height: 720 })
    }

    async fn set_viewport_size(&self, _viewport: Viewport) -> EngineResult<()> {
        Ok(())
    }

    async fn content(&self) -> EngineResult<String> {
        Ok("<html><body></body></html>".to_string())
    }

    async fn inner_text(&self, selector: &str) -> EngineResult<String> {
        Ok(self.state_for(selector).text)
    }

    async fn pdf(&self) -> EngineResult<Vec<u8>> {
        Ok(vec![0x25, 0x50, 0x44, 0x46])
    }

    async fn screenshot(&self, _full_page: bool) -> EngineResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn evaluate(&self, script: &str) -> EngineResult<Value> {
        if script.contains("querySelectorAll(SELECTOR)") {
            return Ok(self.shared.observed_elements.lock().unwrap().clone());
        }
        Ok(Value::Null)
    }

    async fn frames(&self) -> EngineResult<Vec<String>> {
        Ok(vec!["main".to_string()])
    }

    async fn locator(&self, selector: &str) -> EngineResult<Box<dyn EngineLocator>> {
        Ok(Box::new(FakeLocator { selector: selector.to_string(), shared: self.shared.clone() }))
    }

    async fn cookies(&self) -> EngineResult<Value> {
        Ok(json!([]))
    }

    async fn set_cookies(&self, _cookies: Value) -> EngineResult<()> {
        Ok(())
    }

    async fn clear_cookies(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn storage_state(&self) -> EngineResult<Value> {
        Ok(json!({ "cookies": [], "origins": [] }))
    }

    async fn set_storage_state(&self, _state: Value) -> EngineResult<()> {
        Ok(())
    }

    async fn set_geolocation(&self, _geo: Geolocation) -> EngineResult<()> {
        Ok(())
    }

    async fn set_offline(&self, _offline: bool) -> EngineResult<()> {
        Ok(())
    }

    async fn set_user_agent(&self, _ua: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn handle_dialog(&self, _accept: bool, _prompt_text: Option<&str>) -> EngineResult<()> {
        Ok(())
    }
}

struct FakeLocator {
    selector: String,
    shared: Arc<Shared>,
}

impl FakeLocator {
    fn state(&self) -> FakeElementState {
        self.shared.elements.lock().unwrap().get(&self.selector).cloned().unwrap_or_else(FakeElementState::present)
    }

    fn entry(&self) -> std::sync::MutexGuard<'_, HashMap<String, FakeElementState>> {
        self.shared.elements.lock().unwrap()
    }
}

#[async_trait]
impl EngineLocator for FakeLocator {
    async fn click(&self, _timeout: Duration) -> EngineResult<()> {
        let state = self.state();
        if state.count == 0 {
            return Err(EngineError::msg(format!("Timeout 5000ms exceeded waiting for selector {}", self.selector)));
        }
        if !state.visible {
            return Err(EngineError::msg("element is not visible"));
        }
        *self.shared.click_counts.lock().unwrap().entry(self.selector.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn dblclick(&self, timeout: Duration) -> EngineResult<()> {
        self.click(timeout).await
    }

    async fn fill(&self, value: &str, _timeout: Duration) -> EngineResult<()> {
        self.entry().entry(self.selector.clone()).or_insert_with(FakeElementState::present).value = value.to_string();
        Ok(())
    }

    async fn clear(&self, _timeout: Duration) -> EngineResult<()> {
        if let Some(e) = self.entry().get_mut(&self.selector) {
            e.value.clear();
        }
        Ok(())
    }

    async fn type_sequentially(&self, text: &str, _timeout: Duration) -> EngineResult<()> {
        self.entry().entry(self.selector.clone()).or_insert_with(FakeElementState::present).value.push_str(text);
        Ok(())
    }

    async fn press(&self, _key: &str, _timeout: Duration) -> EngineResult<()> {
        Ok(())
    }

    async fn hover(&self, _timeout: Duration) -> EngineResult<()> {
        Ok(())
    }

    async fn scroll_into_view_if_needed(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn select_option(&self, values: &[String], _timeout: Duration) -> EngineResult<()> {
        self.entry().entry(self.selector.clone()).or_insert_with(FakeElementState::present).value =
            values.first().cloned().unwrap_or_default();
        Ok(())
    }

    async fn check(&self, _timeout: Duration) -> EngineResult<()> {
        self.entry().entry(self.selector.clone()).or_insert_with(FakeElementState::present).checked = true;
        Ok(())
    }

    async fn uncheck(&self, _timeout: Duration) -> EngineResult<()> {
        self.entry().entry(self.selector.clone()).or_insert_with(FakeElementState::present).checked = false;
        Ok(())
    }

    async fn set_input_files(&self, _paths: &[String], _timeout: Duration) -> EngineResult<()> {
        Ok(())
    }

    async fn drag_to(&self, _target: &dyn EngineLocator, _timeout: Duration) -> EngineResult<()> {
        Ok(())
    }

    async fn bounding_box(&self) -> EngineResult<Option<(f64, f64, f64, f64)>> {
        Ok(Some((0.0, 0.0, 10.0, 10.0)))
    }

    async fn is_visible(&self) -> EngineResult<bool> {
        let s = self.state();
        Ok(s.count > 0 && s.visible)
    }

    async fn is_enabled(&self) -> EngineResult<bool> {
        Ok(self.state().enabled)
    }

    async fn is_checked(&self) -> EngineResult<bool> {
        Ok(self.state().checked)
    }

    async fn is_disabled(&self) -> EngineResult<bool> {
        Ok(!self.state().enabled)
    }

    async fn inner_text(&self) -> EngineResult<String> {
        Ok(self.state().text)
    }

    async fn input_value(&self) -> EngineResult<String> {
        Ok(self.state().value)
    }

    async fn get_attribute(&self, _name: &str) -> EngineResult<Option<String>> {
        Ok(None)
    }

    async fn count(&self) -> EngineResult<usize> {
        Ok(self.state().count)
    }

    async fn aria_snapshot(&self) -> EngineResult<Value> {
        Ok(json!({ "role": "generic" }))
    }
}
