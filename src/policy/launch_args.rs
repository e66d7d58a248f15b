//! Browser launch-argument allow/block list (spec.md §4.3).
//!
//! The allow-list default is exactly the stealth/hardening flag set the
//! teacher's `browser_setup::launch_browser` always adds (see that
//! function's `config_builder.arg(...)` chain) — those flags are known-benign
//! so a client-supplied launch request may repeat them. The block-list
//! covers the flags the teacher never adds unconditionally and that a
//! hostile client could use to escape the sandbox or exfiltrate data.

use crate::error::BapError;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct LaunchArgPolicy {
    pub blocked_patterns: Vec<Regex>,
    pub allowed_patterns: Option<Vec<Regex>>,
}

impl Default for LaunchArgPolicy {
    fn default() -> Self {
        let blocked = [
            r"^--disable-web-security$",
            r"^--remote-debugging-.*",
            r"^--user-data-dir(=.*)?$",
            r"^--load-extension(=.*)?$",
            r"^--disable-extensions-except(=.*)?$",
            r"^--no-sandbox$",
            r"^--disable-setuid-sandbox$",
            r"^--ignore-certificate-errors$",
        ];
        Self {
            blocked_patterns: blocked
                .iter()
                .map(|p| Regex::new(p).expect("static pattern"))
                .collect(),
            allowed_patterns: None,
        }
    }
}

/// Validate a set of client-supplied browser launch args against the
/// policy. All args must pass; the first violation is reported.
pub fn validate_launch_args(args: &[String], policy: &LaunchArgPolicy) -> Result<(), BapError> {
    for arg in args {
        if policy.blocked_patterns.iter().any(|re| re.is_match(arg)) {
            return Err(
                BapError::invalid_params(format!("Launch argument is blocked: {arg}"))
                    .with_details(serde_json::json!({ "arg": arg })),
            );
        }
        if let Some(allowed) = &policy.allowed_patterns
            && !allowed.iter().any(|re| re.is_match(arg))
        {
            return Err(
                BapError::invalid_params(format!("Launch argument is not in the allow list: {arg}"))
                    .with_details(serde_json::json!({ "arg": arg })),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_disable_web_security() {
        let err = validate_launch_args(
            &["--disable-web-security".to_string()],
            &LaunchArgPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.details.unwrap()["arg"], "--disable-web-security");
    }

    #[test]
    fn blocks_remote_debugging_wildcard() {
        assert!(validate_launch_args(
            &["--remote-debugging-port=9222".to_string()],
            &LaunchArgPolicy::default()
        )
        .is_err());
    }

    #[test]
    fn allows_benign_stealth_flags() {
        let args = vec![
            "--disable-notifications".to_string(),
            "--mute-audio".to_string(),
        ];
        assert!(validate_launch_args(&args, &LaunchArgPolicy::default()).is_ok());
    }

    #[test]
    fn explicit_allow_list_rejects_anything_not_listed() {
        let mut policy = LaunchArgPolicy::default();
        policy.allowed_patterns = Some(vec![Regex::new(r"^--mute-audio$").unwrap()]);
        assert!(validate_launch_args(&["--mute-audio".to_string()], &policy).is_ok());
        assert!(validate_launch_args(&["--some-other-flag".to_string()], &policy).is_err());
    }
}
