//! The `BrowserEngine` capability (spec.md §6.4): the abstract driver
//! surface the rest of the crate depends on. `chromiumoxide` is the only
//! implementation shipped, but every handler is written against these
//! traits so a fake in-memory engine can stand in for tests (see
//! `tests/support/fake_engine.rs`).

mod chromiumoxide_engine;

pub use chromiumoxide_engine::ChromiumoxideEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Message(String),
}

impl EngineError {
    pub fn msg(s: impl Into<String>) -> Self {
        Self::Message(s.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    pub headless: Option<bool>,
    pub args: Vec<String>,
    pub downloads_path: Option<String>,
    pub disable_security: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
    pub viewport: Option<Viewport>,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    pub timezone_id: Option<String>,
    pub geolocation: Option<Geolocation>,
    pub permissions: Vec<String>,
    pub color_scheme: Option<String>,
    pub offline: bool,
    pub storage_state: Option<serde_json::Value>,
}

/// A single enumerated interactive element from §4.10's page-side evaluator.
/// Carries only what the evaluator script itself can cheaply compute;
/// action hints and the final selector string are derived in `observe.rs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedElement {
    pub role: String,
    pub accessible_name: Option<String>,
    pub value: Option<String>,
    pub tag_name: String,
    pub focused: bool,
    pub disabled: bool,
    pub test_id: Option<String>,
    pub dom_id: Option<String>,
    pub name_attr: Option<String>,
    pub aria_label: Option<String>,
    pub parent_role: Option<String>,
    pub sibling_index: Option<u32>,
    /// Structural CSS path fallback computed in-page (spec.md §4.10 step 6).
    pub css_path: String,
    pub bounds: Option<(f64, f64, f64, f64)>,
}

/// An opaque handle to a live browser process (spec.md §3 "Browser").
#[async_trait]
pub trait EngineBrowser: Send + Sync {
    async fn new_context(&self, opts: ContextOptions) -> EngineResult<Box<dyn EngineContext>>;
    async fn close(&self) -> EngineResult<()>;

    /// Downcast hook: `chromiumoxide` creates pages from the `Browser`
    /// handle rather than from a context object, so `page/create` needs to
    /// recover the concrete type behind this trait object.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Named isolation boundary owning pages (spec.md §3 "Context").
#[async_trait]
pub trait EngineContext: Send + Sync {
    async fn new_page(&self) -> EngineResult<Box<dyn EnginePage>>;
    async fn close(&self) -> EngineResult<()>;
}

/// A single tab (spec.md §3 "Page").
#[async_trait]
pub trait EnginePage: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> EngineResult<()>;
    async fn reload(&self, timeout: Duration) -> EngineResult<()>;
    async fn go_back(&self, timeout: Duration) -> EngineResult<bool>;
    async fn go_forward(&self, timeout: Duration) -> EngineResult<bool>;
    async fn close(&self) -> EngineResult<()>;

    async fn url(&self) -> EngineResult<String>;
    async fn title(&self) -> EngineResult<String>;
    async fn viewport_size(&self) -> EngineResult<Viewport>;
    async fn set_viewport_size(&self, viewport: Viewport) -> EngineResult<()>;

    async fn content(&self) -> EngineResult<String>;
    async fn inner_text(&self, selector: &str) -> EngineResult<String>;
    async fn pdf(&self) -> EngineResult<Vec<u8>>;
    async fn screenshot(&self, full_page: bool) -> EngineResult<Vec<u8>>;

    /// Run a serialized JS expression in the page's main world and return
    /// the JSON-decoded result. Used for both §4.10's enumerator/annotator
    /// scripts and `agent/extract`'s heuristic extraction.
    async fn evaluate(&self, script: &str) -> EngineResult<serde_json::Value>;

    async fn frames(&self) -> EngineResult<Vec<String>>;
    async fn locator(&self, selector: &str) -> EngineResult<Box<dyn EngineLocator>>;

    async fn cookies(&self) -> EngineResult<serde_json::Value>;
    async fn set_cookies(&self, cookies: serde_json::Value) -> EngineResult<()>;
    async fn clear_cookies(&self) -> EngineResult<()>;
    async fn storage_state(&self) -> EngineResult<serde_json::Value>;
    async fn set_storage_state(&self, state: serde_json::Value) -> EngineResult<()>;

    async fn set_geolocation(&self, geo: Geolocation) -> EngineResult<()>;
    async fn set_offline(&self, offline: bool) -> EngineResult<()>;
    async fn set_user_agent(&self, ua: &str) -> EngineResult<()>;

    /// Respond to a pending `beforeunload`/`alert`/`confirm`/`prompt` dialog
    /// (spec.md §6.2 "dialog/handle").
    async fn handle_dialog(&self, accept: bool, prompt_text: Option<&str>) -> EngineResult<()>;
}

/// A located element, ready for interaction (spec.md §6.4).
#[async_trait]
pub trait EngineLocator: Send + Sync {
    async fn click(&self, timeout: Duration) -> EngineResult<()>;
    async fn dblclick(&self, timeout: Duration) -> EngineResult<()>;
    async fn fill(&self, value: &str, timeout: Duration) -> EngineResult<()>;
    async fn clear(&self, timeout: Duration) -> EngineResult<()>;
    async fn type_sequentially(&self, text: &str, timeout: Duration) -> EngineResult<()>;
    async fn press(&self, key: &str, timeout: Duration) -> EngineResult<()>;
    async fn hover(&self, timeout: Duration) -> EngineResult<()>;
    async fn scroll_into_view_if_needed(&self) -> EngineResult<()>;
    async fn select_option(&self, values: &[String], timeout: Duration) -> EngineResult<()>;
    async fn check(&self, timeout: Duration) -> EngineResult<()>;
    async fn uncheck(&self, timeout: Duration) -> EngineResult<()>;
    async fn set_input_files(&self, paths: &[String], timeout: Duration) -> EngineResult<()>;
    async fn drag_to(&self, target: &dyn EngineLocator, timeout: Duration) -> EngineResult<()>;

    async fn bounding_box(&self) -> EngineResult<Option<(f64, f64, f64, f64)>>;
    async fn is_visible(&self) -> EngineResult<bool>;
    async fn is_enabled(&self) -> EngineResult<bool>;
    async fn is_checked(&self) -> EngineResult<bool>;
    async fn is_disabled(&self) -> EngineResult<bool>;
    async fn inner_text(&self) -> EngineResult<String>;
    async fn input_value(&self) -> EngineResult<String>;
    async fn get_attribute(&self, name: &str) -> EngineResult<Option<String>>;
    async fn count(&self) -> EngineResult<usize>;
    async fn aria_snapshot(&self) -> EngineResult<serde_json::Value>;
}
