//! Rendering a check result as pretty text or the JSON `Output` document.

use crate::error::CheckError;
use regocheck_ast::Error;
use regocheck_settings::OutputFormat;
use regocheck_types::{Output, OutputError};
use serde_json::json;
use std::io::Write;
use tracing::warn;

/// Pretty-format line for a run without errors.
pub const NO_ERRORS_LINE: &str = "no errors";

/// Write `err` (or its absence) in `format`: to `stdout` on success, `stderr` on failure.
///
/// Returns whether the run failed. A serialization failure is written to `stderr` as plain
/// text; write failures are only logged. Neither changes the verdict.
pub fn output_errors<O: Write, E: Write>(
    format: OutputFormat,
    err: Option<&CheckError>,
    stdout: &mut O,
    stderr: &mut E,
) -> bool {
    let failed = err.is_some();
    let written = match (format, err) {
        (OutputFormat::Pretty, None) => writeln!(stdout, "{NO_ERRORS_LINE}"),
        (OutputFormat::Pretty, Some(err)) => writeln!(stderr, "{err}"),
        (OutputFormat::Json, err) => match serde_json::to_string_pretty(&to_output(err)) {
            Ok(text) if failed => writeln!(stderr, "{text}"),
            Ok(text) => writeln!(stdout, "{text}"),
            Err(e) => writeln!(stderr, "{e}"),
        },
    };
    if let Err(e) = written {
        warn!(error = %e, "write output");
    }
    failed
}

/// Normalize a result into the JSON output document. Diagnostics keep their code and
/// location; any other failure becomes a single message-only entry.
pub fn to_output(err: Option<&CheckError>) -> Output {
    let errors = match err {
        None => Vec::new(),
        Some(err) => match err.diagnostics() {
            Some(diags) => diags.iter().map(output_error).collect(),
            None => vec![OutputError::plain(err.to_string())],
        },
    };
    Output { errors }
}

fn output_error(err: &Error) -> OutputError {
    OutputError {
        message: err.message.clone(),
        code: err.code.to_string(),
        location: err.location.clone(),
        details: err
            .details
            .as_ref()
            .map_or(serde_json::Value::Null, |d| json!({"line": d.line, "idx": d.idx})),
    }
}
