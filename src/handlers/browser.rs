//! `browser/launch` / `browser/close` (spec.md §6.2 "Browser").

use crate::config::Config;
use crate::engine::{ChromiumoxideEngine, LaunchOptions};
use crate::error::{BapError, BapResult};
use crate::policy::{validate_downloads_path, validate_launch_args, LaunchArgPolicy, PathGuardConfig};
use crate::session::Session;
use serde_json::{json, Value};

pub async fn launch(session: &mut Session, config: &Config, params: Value) -> BapResult<Value> {
    let headless = params.get("headless").and_then(Value::as_bool).or(Some(config.headless));
    let args: Vec<String> = params
        .get("args")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let disable_security = params.get("disableSecurity").and_then(Value::as_bool).unwrap_or(false);

    // `disableSecurity` is sugar for `--disable-web-security` /
    // `--ignore-certificate-errors`; validate the combined set so it can't
    // bypass the block-list policy `args` itself is subject to (spec.md
    // §4.3/§7).
    let mut to_validate = args.clone();
    if disable_security {
        to_validate.push("--disable-web-security".to_string());
        to_validate.push("--ignore-certificate-errors".to_string());
    }
    validate_launch_args(&to_validate, &LaunchArgPolicy::default())?;

    let downloads_path = match params.get("downloadsPath").and_then(Value::as_str) {
        Some(raw) => {
            let cfg = PathGuardConfig { allowed_dirs: config.allowed_download_dirs.clone() };
            Some(validate_downloads_path(raw, &cfg)?.to_string_lossy().to_string())
        }
        None => None,
    };

    if session.browser.is_some() {
        session.shutdown().await;
    }

    let opts = LaunchOptions { headless, args, downloads_path, disable_security };
    let (browser, handler) = ChromiumoxideEngine::launch(&opts)
        .await
        .map_err(|e| BapError::from_engine_message(&e.to_string()))?;

    session.browser = Some(browser);
    session.browser_handler = Some(handler);

    Ok(json!({ "launched": true }))
}

pub async fn close(session: &mut Session) -> BapResult<Value> {
    session.shutdown().await;
    session.active_page_id = None;
    Ok(json!({ "closed": true }))
}
