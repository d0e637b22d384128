//! Filesystem adapters for regocheck.
//!
//! - [`Filter`]: ignore patterns plus the `.rego`-only restriction
//! - [`load_files`]: one filtered walk over all input paths, keyed by declared module name
//! - [`load_bundle`]: directory or `.tar.gz` bundles with an optional `.manifest`
//! - [`load_schemas`]: a schema file or directory into a [`regocheck_ast::SchemaSet`]

#![forbid(unsafe_code)]

mod bundle;
mod error;
mod files;
mod filter;
mod schemas;

pub use bundle::{Bundle, BundleOptions, Manifest, load_bundle};
pub use error::LoadError;
pub use files::load_files;
pub use filter::{Filter, REGO_EXT};
pub use schemas::load_schemas;
