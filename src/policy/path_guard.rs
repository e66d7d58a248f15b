//! Downloads-path guard (spec.md §4.3, §8 property 10).

use crate::error::BapError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct PathGuardConfig {
    /// If set, the resolved path must have one of these as a prefix.
    pub allowed_dirs: Option<Vec<PathBuf>>,
}

const BLOCKED_UNIX_PREFIXES: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/var", "/root", "/home", "/tmp", "/sys", "/proc", "/dev",
];

const BLOCKED_WINDOWS_PREFIXES: &[&str] = &["C:\\Windows", "C:\\Program Files"];

/// Validate a client-supplied downloads directory. Resolves symlinks via
/// `canonicalize` where the path exists; for non-existent paths (the common
/// case — a directory the server is expected to create) it instead
/// canonicalizes the nearest existing ancestor and re-appends the remainder,
/// so a traversal cannot be hidden behind a not-yet-created directory.
pub fn validate_downloads_path(input: &str, cfg: &PathGuardConfig) -> Result<PathBuf, BapError> {
    if input.contains("..") || input.contains("//") {
        return Err(
            BapError::invalid_params("Downloads path must not contain '..' or '//'")
                .with_details(serde_json::json!({ "path": input })),
        );
    }

    let path = Path::new(input);
    if !path.is_absolute() {
        return Err(BapError::invalid_params("Downloads path must be absolute"));
    }

    let resolved = canonicalize_best_effort(path);
    let resolved_str = resolved.to_string_lossy().to_string();

    for prefix in BLOCKED_UNIX_PREFIXES {
        if resolved_str == *prefix || resolved_str.starts_with(&format!("{prefix}/")) {
            return Err(
                BapError::invalid_params(format!("Downloads path is under a blocked directory: {prefix}"))
                    .with_details(serde_json::json!({ "path": resolved_str, "blockedPrefix": prefix })),
            );
        }
    }
    for prefix in BLOCKED_WINDOWS_PREFIXES {
        if resolved_str.starts_with(prefix) {
            return Err(
                BapError::invalid_params(format!("Downloads path is under a blocked directory: {prefix}"))
                    .with_details(serde_json::json!({ "path": resolved_str, "blockedPrefix": prefix })),
            );
        }
    }

    if let Some(allowed) = &cfg.allowed_dirs {
        let ok = allowed.iter().any(|dir| resolved.starts_with(dir));
        if !ok {
            return Err(BapError::invalid_params(
                "Downloads path is not under an allowed directory",
            ));
        }
    }

    Ok(resolved)
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    let mut current = path.to_path_buf();
    let mut tail = Vec::new();
    loop {
        if let Ok(canon) = current.canonicalize() {
            let mut result = canon;
            for component in tail.into_iter().rev() {
                result.push(component);
            }
            return result;
        }
        match current.file_name().map(|n| n.to_owned()) {
            Some(name) => {
                tail.push(name);
                current.pop();
            }
            None => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_sequence() {
        let err = validate_downloads_path("/home/user/../../etc", &PathGuardConfig::default())
            .unwrap_err();
        assert!(err.details.is_some());
    }

    #[test]
    fn rejects_double_slash() {
        assert!(validate_downloads_path("/home//user", &PathGuardConfig::default()).is_err());
    }

    #[test]
    fn rejects_blocked_system_dir() {
        assert!(validate_downloads_path("/etc/bap", &PathGuardConfig::default()).is_err());
    }

    #[test]
    fn rejects_relative_path() {
        assert!(validate_downloads_path("downloads", &PathGuardConfig::default()).is_err());
    }

    #[test]
    fn allow_list_enforces_prefix() {
        let cfg = PathGuardConfig {
            allowed_dirs: Some(vec![PathBuf::from("/srv/allowed")]),
        };
        assert!(validate_downloads_path("/srv/other", &cfg).is_err());
    }
}
