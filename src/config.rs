//! Server configuration, read entirely from environment variables
//! (spec.md §6.5). Grounded on the teacher's `Config`/`BrowserConfig`
//! structs (`src/lib.rs`) for the defaulted-field shape, adapted from
//! `serde(default)` YAML deserialization to `std::env::var` parsing since
//! the spec names environment variables, not a config file, as the only
//! external surface.

use crate::approval::{ApprovalRule, DEFAULT_APPROVAL_TIMEOUT};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub auth_token: Option<String>,
    pub scopes: HashSet<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub allowed_download_dirs: Option<Vec<PathBuf>>,
    pub max_connections_per_ip: u32,
    pub max_message_bytes: usize,
    pub headless: bool,
    pub debug: bool,
    pub require_tls: bool,
    /// Method patterns (spec.md §4.11) that suspend for human approval
    /// before the handler runs. Empty by default: approval gating is an
    /// opt-in deployment policy, not a protocol default.
    pub approval_rules: Vec<ApprovalRule>,
    pub approval_timeout: Duration,
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_str(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_str(key).as_deref() {
        Some("1") | Some("true") | Some("TRUE") | Some("yes") => true,
        Some("0") | Some("false") | Some("FALSE") | Some("no") => false,
        _ => default,
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_str(key).map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

/// Parse `BAP_APPROVAL_RULES` as `name=pattern` pairs, e.g.
/// `downloads=page/navigate,danger=browser/launch`.
fn approval_rules_from_env() -> Vec<ApprovalRule> {
    env_list("BAP_APPROVAL_RULES")
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            let (name, pattern) = entry.split_once('=')?;
            Some(ApprovalRule { name: name.to_string(), method_pattern: pattern.to_string() })
        })
        .collect()
}

/// Scope profiles named by spec.md §4.2 ("readonly", "standard", "full",
/// "privileged") used when `BAP_SCOPES` is unset.
fn scopes_for_profile(profile: &str) -> HashSet<String> {
    let scopes: &[&str] = match profile {
        "privileged" => &["*"],
        "full" => &[
            "browser:*", "context:*", "page:*", "frame:*", "action:*", "observe:*",
            "storage:*", "network:*", "emulate:*", "dialog:*", "trace:*", "events:*",
            "stream:*", "approval:*", "agent:*",
        ],
        "standard" => &[
            "browser:launch", "browser:close", "context:create", "context:read", "context:destroy",
            "page:create", "page:navigate", "page:close", "page:read", "frame:read",
            "action:write", "observe:read", "agent:act", "agent:observe", "agent:extract",
            "events:subscribe", "stream:cancel", "approval:respond",
        ],
        _ => &["observe:read", "page:read", "context:read", "frame:read"],
    };
    scopes.iter().map(|s| s.to_string()).collect()
}

impl Config {
    pub fn from_env() -> Self {
        let profile = env_str("BAP_DEFAULT_PROFILE").unwrap_or_else(|| "readonly".to_string());
        let scopes = env_list("BAP_SCOPES")
            .map(|list| list.into_iter().collect())
            .unwrap_or_else(|| scopes_for_profile(&profile));

        let is_production = env_str("NODE_ENV").as_deref() == Some("production");

        Self {
            host: env_parsed("BAP_HOST", "127.0.0.1".parse().expect("valid default host")),
            port: env_parsed("BAP_PORT", 8765),
            auth_token: env_str("BAP_AUTH_TOKEN"),
            scopes,
            allowed_origins: env_list("BAP_ALLOWED_ORIGINS"),
            allowed_download_dirs: env_list("BAP_ALLOWED_DOWNLOAD_DIRS")
                .map(|dirs| dirs.into_iter().map(PathBuf::from).collect()),
            max_connections_per_ip: env_parsed("BAP_MAX_CONNECTIONS_PER_IP", 10),
            max_message_bytes: env_parsed("BAP_MAX_MESSAGE_SIZE", 10 * 1024 * 1024),
            headless: env_bool("BAP_HEADLESS", true),
            debug: env_bool("BAP_DEBUG", false),
            require_tls: env_bool("BAP_REQUIRE_TLS", is_production),
            approval_rules: approval_rules_from_env(),
            approval_timeout: Duration::from_millis(env_parsed("BAP_APPROVAL_TIMEOUT_MS", DEFAULT_APPROVAL_TIMEOUT.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readonly_profile_excludes_writes() {
        let scopes = scopes_for_profile("readonly");
        assert!(scopes.contains("observe:read"));
        assert!(!scopes.contains("action:write"));
    }

    #[test]
    fn privileged_profile_is_wildcard() {
        let scopes = scopes_for_profile("privileged");
        assert!(scopes.contains("*"));
    }

    #[test]
    fn unknown_profile_falls_back_to_readonly() {
        assert_eq!(scopes_for_profile("nonsense"), scopes_for_profile("readonly"));
    }
}
