//! URL guard for navigation-like methods (spec.md §4.3).
//!
//! The default block list is grounded on `turbomcp-auth::ssrf`'s cloud
//! metadata denylist in the pack — BAP's closed set of blocked hosts below
//! is the same well-known set (AWS/GCP/Alibaba/IPv6 metadata endpoints)
//! that module hard-codes.

use crate::error::BapError;
use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone)]
pub struct UrlGuardConfig {
    pub allowed_protocols: Option<HashSet<String>>,
    pub blocked_protocols: HashSet<String>,
    pub allowed_hosts: Option<Vec<String>>,
    pub blocked_hosts: HashSet<String>,
}

impl Default for UrlGuardConfig {
    fn default() -> Self {
        Self {
            allowed_protocols: None,
            blocked_protocols: ["file", "javascript", "data", "vbscript"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_hosts: None,
            blocked_hosts: [
                "169.254.169.254",
                "metadata.google.internal",
                "metadata.goog",
                "100.100.100.200",
                "fd00:ec2::254",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

fn host_matches(host: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        host == suffix || host.ends_with(&format!(".{suffix}"))
    } else {
        host == pattern
    }
}

fn is_private_or_loopback(host: &str) -> bool {
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return ip.is_loopback()
            || match ip {
                std::net::IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
                std::net::IpAddr::V6(v6) => {
                    v6.is_unique_local() || v6.is_unicast_link_local()
                }
            };
    }
    host == "localhost"
}

/// Validate a navigation target URL. Returns `Ok(())` if allowed, else a
/// `BapError(InvalidParams)` with a machine-readable `details.blocked` field
/// (spec.md S4 scenario).
pub fn validate_navigation_url(url_str: &str, cfg: &UrlGuardConfig) -> Result<(), BapError> {
    let parsed = Url::parse(url_str)
        .map_err(|_| BapError::invalid_params(format!("Invalid URL: {url_str}")))?;

    let scheme = parsed.scheme();
    let protocol_allowed = if let Some(allow) = &cfg.allowed_protocols {
        allow.contains(scheme)
    } else {
        !cfg.blocked_protocols.contains(scheme)
    };
    if !protocol_allowed {
        return Err(BapError::invalid_params(format!(
            "Protocol '{scheme}' is not allowed"
        ))
        .with_details(serde_json::json!({ "blocked": scheme })));
    }

    let host = parsed.host_str().unwrap_or_default().to_string();
    let host_allowed = if let Some(allow) = &cfg.allowed_hosts {
        allow.iter().any(|p| host_matches(&host, p))
    } else {
        !cfg.blocked_hosts.iter().any(|p| host_matches(&host, p))
    };
    if !host_allowed {
        return Err(
            BapError::invalid_params(format!("Host '{host}' is not allowed"))
                .with_details(serde_json::json!({ "blocked": host })),
        );
    }

    if is_private_or_loopback(&host) {
        tracing::warn!(host = %host, "navigating to loopback or private-range host");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_file_protocol_by_default() {
        let err = validate_navigation_url("file:///etc/passwd", &UrlGuardConfig::default())
            .unwrap_err();
        assert_eq!(err.details.unwrap()["blocked"], "file");
    }

    #[test]
    fn blocks_cloud_metadata_host_by_default() {
        let err = validate_navigation_url(
            "http://169.254.169.254/latest/meta-data/",
            &UrlGuardConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.details.unwrap()["blocked"], "169.254.169.254");
    }

    #[test]
    fn allows_ordinary_https_url() {
        assert!(validate_navigation_url("https://example.test/login", &UrlGuardConfig::default()).is_ok());
    }

    #[test]
    fn allow_list_wildcard_suffix_matches() {
        let mut cfg = UrlGuardConfig::default();
        cfg.allowed_hosts = Some(vec!["*.example.test".into()]);
        assert!(validate_navigation_url("https://app.example.test/", &cfg).is_ok());
        assert!(validate_navigation_url("https://evil.test/", &cfg).is_err());
    }
}
