use crate::error::LoadError;
use crate::filter::Filter;
use camino::Utf8PathBuf;
use regocheck_ast::{Errors, ModuleMap, ParserOptions, parse_module};
use tracing::debug;

/// Walk every input path once, parse each surviving file and key it by its declared module
/// name (`data.<package>`).
///
/// Two files declaring the same package collapse into one entry: the one walked last wins.
/// Parse errors from all files are collected before failing.
pub fn load_files(
    paths: &[Utf8PathBuf],
    filter: &Filter,
    opts: &ParserOptions<'_>,
) -> Result<ModuleMap, LoadError> {
    let mut files = Vec::new();
    for root in paths {
        let found = filter.walk(root)?;
        debug!(root = %root, files = found.len(), "walked input path");
        files.extend(found);
    }

    let mut modules = ModuleMap::new();
    let mut errors = Vec::new();
    for path in files {
        let source = std::fs::read_to_string(&path).map_err(|e| LoadError::io(&path, e))?;
        match parse_module(path.as_str(), &source, opts) {
            Ok(module) => {
                let name = module.name();
                if let Some(prev) = modules.insert(name.clone(), module) {
                    debug!(module = %name, replaced = %prev.file, by = %path, "module name reused");
                }
            }
            Err(errs) => errors.extend(errs.into_vec()),
        }
    }

    if !errors.is_empty() {
        return Err(LoadError::Parse(Errors::new(errors, false)));
    }
    Ok(modules)
}
