//! The `check` use case: load policies and prove they parse and compile.

use crate::error::CheckError;
use camino::Utf8PathBuf;
use regocheck_ast::{
    Capabilities, Compiler, Errors, ModuleMap, ParserOptions, RegoVersion, SchemaSet,
};
use regocheck_loader::{BundleOptions, Filter, LoadError, load_bundle, load_files, load_schemas};
use regocheck_settings::CheckConfig;
use tracing::{debug, info};

/// The explicit capabilities when configured (custom built-ins and all), otherwise the
/// capabilities of this build for the configured language version.
pub fn resolve_capabilities(config: &CheckConfig) -> Capabilities {
    match &config.capabilities {
        Some(explicit) => {
            debug!(builtins = explicit.builtins.len(), "using explicit capabilities");
            explicit.clone()
        }
        None => {
            let version = config.rego_version();
            debug!(%version, "deriving capabilities");
            Capabilities::for_this_version(version)
        }
    }
}

/// Collect modules from `paths`.
///
/// Bundle mode loads each path as a bundle and merges them, later bundles replacing earlier
/// keys. Otherwise one filtered walk picks up `.rego` files keyed by declared module name.
pub fn load_modules(
    config: &CheckConfig,
    paths: &[Utf8PathBuf],
    version: RegoVersion,
    capabilities: &Capabilities,
) -> Result<ModuleMap, LoadError> {
    let filter = Filter::new(&config.ignore)?;

    if config.bundle_mode {
        let opts = BundleOptions {
            rego_version: version,
            capabilities: Some(capabilities),
        };
        let mut modules = ModuleMap::new();
        for path in paths {
            let bundle = load_bundle(path, &filter, &opts)?;
            modules.extend(bundle.modules);
        }
        return Ok(modules);
    }

    let opts = ParserOptions {
        rego_version: version,
        capabilities: Some(capabilities),
        process_annotations: true,
    };
    load_files(paths, &filter.only_rego(), &opts)
}

/// Compile every module together. `Err` holds at least one error.
pub fn compile_modules(
    config: &CheckConfig,
    capabilities: &Capabilities,
    schemas: &SchemaSet,
    modules: &ModuleMap,
) -> Result<(), Errors> {
    let mut compiler = Compiler::new()
        .with_error_limit(config.error_limit)
        .with_capabilities(capabilities)
        .with_schemas(schemas)
        .with_enable_print_statements(true)
        .with_strict(config.strict)
        .with_use_type_check_annotations(true);
    compiler.compile(modules);

    if compiler.failed() {
        return Err(compiler.into_errors());
    }
    Ok(())
}

pub fn check(config: &CheckConfig, paths: &[Utf8PathBuf]) -> Result<(), CheckError> {
    let version = config.rego_version();
    info!(%version, bundle = config.bundle_mode, paths = paths.len(), "checking");

    let capabilities = resolve_capabilities(config);
    let schemas = load_schemas(config.schema.as_deref())?;
    let modules = load_modules(config, paths, version, &capabilities)?;
    info!(modules = modules.len(), schemas = schemas.len(), "loaded");

    compile_modules(config, &capabilities, &schemas, &modules)?;
    Ok(())
}
