//! Use case orchestration for regocheck.
//!
//! The pipeline is: resolve the language version, resolve capabilities, load schemas, load
//! modules (bundle or filtered walk), compile, then report. The CLI crate only parses arguments
//! and maps the verdict to an exit code.

#![forbid(unsafe_code)]

mod check;
mod error;
mod report;

pub use check::{check, compile_modules, load_modules, resolve_capabilities};
pub use error::CheckError;
pub use report::{NO_ERRORS_LINE, output_errors, to_output};
