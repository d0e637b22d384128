//! Config parsing and resolution for `regocheck check`.
//!
//! Parsing works on strings; the only file this crate reads is an explicit capabilities document.

#![forbid(unsafe_code)]

mod error;
mod model;
mod resolve;

pub use error::SettingsError;
pub use model::{CheckConfig, DEFAULT_MAX_ERRORS, OutputFormat, RegocheckConfigV1};
pub use resolve::{Overrides, load_capabilities, resolve_config};

/// Conventional config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".regocheck.toml";

/// Parse `.regocheck.toml` (or equivalent) into a typed model.
pub fn parse_config_toml(input: &str) -> Result<RegocheckConfigV1, SettingsError> {
    let cfg: RegocheckConfigV1 = toml::from_str(input)?;
    Ok(cfg)
}
