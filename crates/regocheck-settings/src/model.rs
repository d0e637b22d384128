use crate::error::SettingsError;
use camino::Utf8PathBuf;
use regocheck_ast::{Capabilities, RegoVersion};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_ERRORS: usize = 10;

/// `.regocheck.toml` schema v1.
///
/// Every key is optional; command-line flags take precedence over the file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RegocheckConfigV1 {
    /// Output format: `pretty` (default) or `json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Stop after this many compile errors; 0 means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_errors: Option<usize>,

    /// Base-name globs of files and directories to skip.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,

    /// Load every path as a bundle directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<bool>,

    /// Path to a capabilities JSON document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<String>,

    /// Schema file or directory used for annotation type checking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,

    /// Require policies to be valid under both v0 and v1 rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rego_v1: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v0_compatible: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v1_compatible: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for OutputFormat {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(OutputFormat::Pretty),
            "json" => Ok(OutputFormat::Json),
            other => Err(SettingsError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Pretty => "pretty",
            OutputFormat::Json => "json",
        })
    }
}

/// Everything one check run needs. Built once, then only read.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckConfig {
    pub format: OutputFormat,
    /// 0 means unlimited.
    pub error_limit: usize,
    pub ignore: Vec<String>,
    pub bundle_mode: bool,
    /// Used as-is when present, custom built-ins included.
    pub capabilities: Option<Capabilities>,
    pub schema: Option<Utf8PathBuf>,
    pub strict: bool,
    pub rego_v1: bool,
    pub v0_compatible: bool,
    pub v1_compatible: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Pretty,
            error_limit: DEFAULT_MAX_ERRORS,
            ignore: Vec::new(),
            bundle_mode: false,
            capabilities: None,
            schema: None,
            strict: false,
            rego_v1: false,
            v0_compatible: false,
            v1_compatible: false,
        }
    }
}

impl CheckConfig {
    /// Language version for this run. The first set flag wins, in this order:
    /// `rego_v1`, `v0_compatible`, `v1_compatible`.
    pub fn rego_version(&self) -> RegoVersion {
        if self.rego_v1 {
            return RegoVersion::V0CompatV1;
        }
        if self.v0_compatible {
            return RegoVersion::V0;
        }
        if self.v1_compatible {
            return RegoVersion::V1;
        }
        RegoVersion::DEFAULT
    }
}
