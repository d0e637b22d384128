//! Rule table: every rule grouped by its full path, and the structural checks on those groups.

use crate::ast::{Module, ModuleMap, Rule, RuleKind};
use crate::error::{Error, ErrorSink};
use regocheck_types::Location;
use std::collections::BTreeMap;

pub(crate) struct RuleEntry<'m> {
    pub(crate) rule: &'m Rule,
}

/// Rules keyed by path (`data.<package>.<name>`), in module-key then source order.
#[derive(Default)]
pub(crate) struct RuleTable<'m> {
    rules: BTreeMap<String, Vec<RuleEntry<'m>>>,
}

impl<'m> RuleTable<'m> {
    pub(crate) fn build(modules: &'m ModuleMap) -> Self {
        let mut rules: BTreeMap<String, Vec<RuleEntry<'m>>> = BTreeMap::new();
        for module in modules.values() {
            let pkg = module.package.data_path();
            for rule in &module.rules {
                rules
                    .entry(format!("{pkg}.{}", rule.head.name))
                    .or_default()
                    .push(RuleEntry { rule });
            }
        }
        Self { rules }
    }

    pub(crate) fn has_rule(&self, path: &str) -> bool {
        self.rules.contains_key(path)
    }

    /// A rule is defined at `path` or somewhere below it (`a` for `a.b.c := 1`).
    pub(crate) fn defines(&self, path: &str) -> bool {
        self.has_rule(path) || self.paths_under(path).next().is_some()
    }

    /// Arity of the function defined at `path`, if `path` names a function.
    pub(crate) fn function_arity(&self, path: &str) -> Option<usize> {
        match self.rules.get(path)?.first()?.rule.kind() {
            RuleKind::Function(n) => Some(n),
            _ => None,
        }
    }

    /// Location of the first rule defined at `path`.
    pub(crate) fn location(&self, path: &str) -> Option<&'m Location> {
        self.rules.get(path)?.first().map(|e| &e.rule.location)
    }

    /// Rule paths strictly below `prefix`.
    pub(crate) fn paths_under<'s>(&'s self, prefix: &'s str) -> impl Iterator<Item = &'s str> {
        self.rules
            .keys()
            .filter(move |k| {
                prefix == "data"
                    || k.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'))
            })
            .map(String::as_str)
    }

    fn groups(&self) -> impl Iterator<Item = (&str, &[RuleEntry<'m>])> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

pub(crate) fn check(table: &RuleTable<'_>, modules: &ModuleMap, sink: &mut ErrorSink) {
    for (path, entries) in table.groups() {
        if sink.halted() {
            return;
        }
        check_group(path, entries, sink);
        check_nested(table, path, entries, sink);
    }
    for module in modules.values() {
        check_package(module, table, sink);
    }
}

fn check_group(path: &str, entries: &[RuleEntry<'_>], sink: &mut ErrorSink) {
    let Some(first) = entries.first() else {
        return;
    };

    let kind = first.rule.kind();
    if entries.iter().any(|e| e.rule.kind() != kind) {
        sink.push(Error::type_error(
            &first.rule.location,
            format!("conflicting rules {path} found"),
        ));
        return;
    }

    let defaults: Vec<&Rule> = entries.iter().map(|e| e.rule).filter(|r| r.default).collect();
    if let [_, second, ..] = defaults.as_slice() {
        sink.push(Error::type_error(
            &second.location,
            format!("multiple default rules {path} found"),
        ));
    }

    if kind == RuleKind::Complete {
        let values: Vec<&Rule> = entries.iter().map(|e| e.rule).filter(|r| !r.default).collect();
        if values.len() > 1 && values.iter().any(|r| r.head.assign) {
            let second = values[1];
            sink.push(Error::type_error(
                &second.location,
                format!("rule named {} redeclared at {}", second.head.name, second.location),
            ));
        }
    }
}

/// A complete rule or function cannot also have rules defined below its path.
fn check_nested(table: &RuleTable<'_>, path: &str, entries: &[RuleEntry<'_>], sink: &mut ErrorSink) {
    let Some(first) = entries.first() else {
        return;
    };
    if !matches!(first.rule.kind(), RuleKind::Complete | RuleKind::Function(_)) {
        return;
    }
    let nested: Vec<&str> = table.paths_under(path).collect();
    if !nested.is_empty() {
        sink.push(Error::type_error(
            &first.rule.location,
            format!("rule {path} conflicts with [{}]", nested.join(" ")),
        ));
    }
}

fn check_package(module: &Module, table: &RuleTable<'_>, sink: &mut ErrorSink) {
    let pkg = module.package.data_path();
    if let Some(loc) = table.location(&pkg) {
        sink.push(Error::type_error(
            &module.package.location,
            format!("package {pkg} conflicts with rule defined at {loc}"),
        ));
    }
}
