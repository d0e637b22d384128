//! Stable DTOs and codes used across the regocheck workspace.
//!
//! This crate is intentionally boring:
//! - source locations attached to diagnostics
//! - stable diagnostic code strings
//! - the JSON output envelope consumed by downstream tooling

#![forbid(unsafe_code)]

pub mod ids;
pub mod location;
pub mod output;

pub use location::Location;
pub use output::{Output, OutputError};
