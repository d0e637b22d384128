use serde::{Deserialize, Serialize};
use std::fmt;

/// Language version a module is parsed and compiled under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegoVersion {
    /// Legacy syntax: `if`, `contains`, `in`, `every` must be imported.
    V0,
    /// Current syntax: keywords are reserved and `if`/`contains` are mandatory.
    #[default]
    V1,
    /// Accepts v0 syntax rules but holds modules to every v1 requirement.
    V0CompatV1,
}

impl RegoVersion {
    pub const DEFAULT: RegoVersion = RegoVersion::V1;

    /// Whether modules are held to v1 requirements (mandatory `if`, no deprecated built-ins, ...).
    pub fn enforces_v1(self) -> bool {
        matches!(self, RegoVersion::V1 | RegoVersion::V0CompatV1)
    }

    /// Whether future keywords are reserved without an explicit import.
    pub fn keywords_reserved(self) -> bool {
        self == RegoVersion::V1
    }

    /// Numeric form used by bundle manifests (`rego_version: 0 | 1`).
    pub fn from_manifest_number(n: i64) -> Option<RegoVersion> {
        match n {
            0 => Some(RegoVersion::V0),
            1 => Some(RegoVersion::V1),
            _ => None,
        }
    }
}

impl fmt::Display for RegoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegoVersion::V0 => "v0",
            RegoVersion::V1 => "v1",
            RegoVersion::V0CompatV1 => "v0v1",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_v1() {
        assert_eq!(RegoVersion::default(), RegoVersion::DEFAULT);
        assert_eq!(RegoVersion::DEFAULT, RegoVersion::V1);
    }

    #[test]
    fn compat_mode_enforces_v1_without_reserving_keywords() {
        assert!(RegoVersion::V0CompatV1.enforces_v1());
        assert!(!RegoVersion::V0CompatV1.keywords_reserved());
        assert!(!RegoVersion::V0.enforces_v1());
    }

    #[test]
    fn manifest_numbers() {
        assert_eq!(RegoVersion::from_manifest_number(0), Some(RegoVersion::V0));
        assert_eq!(RegoVersion::from_manifest_number(1), Some(RegoVersion::V1));
        assert_eq!(RegoVersion::from_manifest_number(2), None);
    }
}
