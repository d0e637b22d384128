//! CLI entry point for regocheck.
//!
//! This module is intentionally thin: it handles argument parsing, logging setup, and exit
//! codes. The pipeline itself lives in the `regocheck-app` crate.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use regocheck_app::output_errors;
use regocheck_settings::{CONFIG_FILE_NAME, Overrides, RegocheckConfigV1};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`debug`, `regocheck_app=info`, ...).
const LOG_ENV: &str = "REGOCHECK_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "regocheck",
    version,
    about = "Static parse and compile validation for Rego policies"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check Rego source files for parse and compilation errors.
    ///
    /// Nothing is printed when every file parses and compiles. Otherwise the errors are
    /// written to stderr and the exit code is 1.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Files or directories to check.
    #[arg(required = true)]
    paths: Vec<Utf8PathBuf>,

    /// Output format (pretty|json).
    #[arg(long, short = 'f')]
    format: Option<String>,

    /// Maximum number of compile errors to report; 0 means unlimited (default 10).
    #[arg(long, short = 'm')]
    max_errors: Option<usize>,

    /// Skip files and directories whose name matches this glob (repeatable).
    #[arg(long)]
    ignore: Vec<String>,

    /// Load each path as a bundle directory.
    #[arg(long, short = 'b')]
    bundle: bool,

    /// Capabilities JSON document to compile against.
    #[arg(long)]
    capabilities: Option<Utf8PathBuf>,

    /// JSON Schema file or directory for annotation type checks.
    #[arg(long, short = 's')]
    schema: Option<Utf8PathBuf>,

    /// Enable strict-mode checks.
    #[arg(long, short = 'S')]
    strict: bool,

    /// Require policies to be valid under both v0 and v1 rules.
    #[arg(long)]
    rego_v1: bool,

    /// Parse and compile with v0 rules.
    #[arg(long)]
    v0_compatible: bool,

    /// Parse and compile with v1 rules.
    #[arg(long)]
    v1_compatible: bool,

    /// Config TOML. Defaults to `.regocheck.toml` in the working directory, if present.
    #[arg(long)]
    config: Option<Utf8PathBuf>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.cmd {
        Commands::Check(args) => cmd_check(args),
    };
    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("regocheck error: {err:#}");
            std::process::exit(1);
        }
    }
}

/// Log to stderr only; stdout is reserved for report output.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<i32> {
    let file = read_config(args.config.as_deref())?;
    let overrides = Overrides {
        format: args.format,
        max_errors: args.max_errors,
        ignore: args.ignore,
        bundle: args.bundle,
        capabilities: args.capabilities,
        schema: args.schema,
        strict: args.strict,
        rego_v1: args.rego_v1,
        v0_compatible: args.v0_compatible,
        v1_compatible: args.v1_compatible,
    };
    let config = regocheck_settings::resolve_config(file, overrides).context("resolve config")?;

    match regocheck_app::check(&config, &args.paths) {
        Ok(()) => Ok(0),
        Err(err) => {
            output_errors(
                config.format,
                Some(&err),
                &mut std::io::stdout().lock(),
                &mut std::io::stderr().lock(),
            );
            Ok(1)
        }
    }
}

/// An explicit `--config` must exist; the conventional file is optional.
fn read_config(explicit: Option<&Utf8Path>) -> anyhow::Result<RegocheckConfigV1> {
    let path = match explicit {
        Some(path) => path.to_owned(),
        None => {
            let default = Utf8PathBuf::from(CONFIG_FILE_NAME);
            if !default.is_file() {
                return Ok(RegocheckConfigV1::default());
            }
            default
        }
    };
    debug!(path = %path, "reading config");
    let text = std::fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
    regocheck_settings::parse_config_toml(&text).with_context(|| format!("parse {path}"))
}
