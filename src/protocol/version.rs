use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` protocol version (spec.md §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    pub const CURRENT: ProtocolVersion = ProtocolVersion {
        major: 1,
        minor: 0,
        patch: 0,
    };

    /// Compatible iff majors match; server minor < client minor is a warning
    /// the caller logs, not a rejection.
    pub fn compatible_with(&self, client: &ProtocolVersion) -> bool {
        self.major == client.major
    }

    pub fn server_is_behind(&self, client: &ProtocolVersion) -> bool {
        self.minor < client.minor
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let mut next = || -> Result<u32, String> {
            parts
                .next()
                .ok_or_else(|| format!("invalid version string: {s}"))?
                .parse::<u32>()
                .map_err(|_| format!("invalid version string: {s}"))
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        Ok(ProtocolVersion { major, minor, patch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let v: ProtocolVersion = "1.2.3".parse().unwrap();
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn major_mismatch_is_incompatible() {
        let server: ProtocolVersion = "1.0.0".parse().unwrap();
        let client: ProtocolVersion = "2.0.0".parse().unwrap();
        assert!(!server.compatible_with(&client));
    }

    #[test]
    fn lower_server_minor_is_a_warning_not_a_rejection() {
        let server: ProtocolVersion = "1.0.0".parse().unwrap();
        let client: ProtocolVersion = "1.3.0".parse().unwrap();
        assert!(server.compatible_with(&client));
        assert!(server.server_is_behind(&client));
    }
}
