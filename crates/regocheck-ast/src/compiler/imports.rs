use crate::ast::{Import, ModuleMap};
use crate::error::{Error, ErrorSink};
use std::collections::{BTreeMap, BTreeSet};

fn describe(imp: &Import) -> String {
    match &imp.alias {
        Some(alias) => format!("import {} as {alias}", imp.path_string()),
        None => format!("import {}", imp.path_string()),
    }
}

/// Two imports binding the same name. Checked in strict mode and for v1 modules.
pub(crate) fn check_duplicates(modules: &ModuleMap, strict: bool, sink: &mut ErrorSink) {
    for module in modules.values() {
        if !(strict || module.rego_version.enforces_v1()) {
            continue;
        }
        let mut seen = BTreeSet::new();
        for imp in &module.imports {
            let Some(name) = imp.name() else {
                continue;
            };
            if !seen.insert(name) {
                sink.push(Error::compile(
                    &imp.location,
                    format!("import must not shadow {}", describe(imp)),
                ));
            }
        }
    }
}

/// Imports never referenced in their module. `used` maps module key -> referenced import names.
pub(crate) fn check_unused(
    modules: &ModuleMap,
    used: &BTreeMap<String, BTreeSet<String>>,
    sink: &mut ErrorSink,
) {
    for (key, module) in modules {
        let referenced = used.get(key);
        for imp in &module.imports {
            let Some(name) = imp.name() else {
                continue;
            };
            if !referenced.is_some_and(|names| names.contains(name)) {
                sink.push(Error::compile(&imp.location, format!("{} unused", describe(imp))));
            }
        }
    }
}
