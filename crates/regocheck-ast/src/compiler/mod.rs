//! Static compilation of a module set.
//!
//! Stages run in a fixed order: rule table, imports, bodies (safety and calls), unused imports
//! (strict only), recursion, annotation type check. Compilation stops after the first stage
//! that reports an error, or as soon as the error limit is hit.

mod check;
mod imports;
mod recursion;
mod rules;
mod typecheck;

use crate::ast::ModuleMap;
use crate::capabilities::Capabilities;
use crate::error::{ErrorSink, Errors};
use crate::schema::SchemaSet;
use crate::version::RegoVersion;
use std::borrow::Cow;
use tracing::debug;

pub struct Compiler<'a> {
    capabilities: Cow<'a, Capabilities>,
    schemas: Option<&'a SchemaSet>,
    /// 0 means unlimited.
    error_limit: usize,
    enable_print_statements: bool,
    strict: bool,
    use_type_check_annotations: bool,
    errors: Errors,
}

impl Default for Compiler<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Compiler<'a> {
    pub fn new() -> Self {
        Self {
            capabilities: Cow::Owned(Capabilities::for_this_version(RegoVersion::DEFAULT)),
            schemas: None,
            error_limit: 0,
            enable_print_statements: false,
            strict: false,
            use_type_check_annotations: false,
            errors: Errors::default(),
        }
    }

    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }

    pub fn with_capabilities(mut self, capabilities: &'a Capabilities) -> Self {
        self.capabilities = Cow::Borrowed(capabilities);
        self
    }

    pub fn with_schemas(mut self, schemas: &'a SchemaSet) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// When disabled, `print(...)` calls are erased before checking.
    pub fn with_enable_print_statements(mut self, enabled: bool) -> Self {
        self.enable_print_statements = enabled;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_use_type_check_annotations(mut self, enabled: bool) -> Self {
        self.use_type_check_annotations = enabled;
        self
    }

    pub fn compile(&mut self, modules: &ModuleMap) {
        debug!(
            modules = modules.len(),
            strict = self.strict,
            error_limit = self.error_limit,
            "compiling modules"
        );
        let mut sink = ErrorSink::new(self.error_limit);
        self.run(modules, &mut sink);
        self.errors = sink.finish();
        debug!(errors = self.errors.len(), "compile finished");
    }

    fn run(&self, modules: &ModuleMap, sink: &mut ErrorSink) {
        let table = rules::RuleTable::build(modules);
        rules::check(&table, modules, sink);
        if sink.has_errors() {
            return;
        }

        imports::check_duplicates(modules, self.strict, sink);
        if sink.has_errors() {
            return;
        }

        let opts = check::Options {
            enable_print: self.enable_print_statements,
            strict: self.strict,
        };
        let outcome = check::check_modules(modules, &table, &self.capabilities, opts, sink);
        if sink.has_errors() {
            return;
        }

        if self.strict {
            imports::check_unused(modules, &outcome.used_imports, sink);
            if sink.has_errors() {
                return;
            }
        }

        recursion::check(&table, &outcome.deps, sink);
        if sink.has_errors() {
            return;
        }

        if self.use_type_check_annotations {
            typecheck::check(modules, self.schemas, sink);
        }
    }

    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    pub fn into_errors(self) -> Errors {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::parser::{ParserOptions, parse_module};
    use regocheck_types::ids;
    use serde_json::json;

    fn modules(version: RegoVersion, srcs: &[(&str, &str)]) -> ModuleMap {
        let opts = ParserOptions {
            rego_version: version,
            ..ParserOptions::default()
        };
        srcs.iter()
            .map(|(file, src)| {
                let m = parse_module(file, src, &opts).expect("parse");
                (file.to_string(), m)
            })
            .collect()
    }

    fn compile(compiler: Compiler<'_>, srcs: &[(&str, &str)]) -> Errors {
        let mut compiler = compiler.with_enable_print_statements(true);
        compiler.compile(&modules(RegoVersion::V1, srcs));
        compiler.into_errors()
    }

    fn messages(errs: &Errors) -> Vec<(&'static str, String)> {
        errs.iter().map(|e: &Error| (e.code, e.message.clone())).collect()
    }

    #[test]
    fn well_formed_policy_compiles() {
        let errs = compile(
            Compiler::new().with_strict(true),
            &[(
                "authz.rego",
                r#"package authz

default allow := false

allow if {
    some role in input.user.roles
    role == "admin"
}

names := [n | some u in input.users; n := u.name]

deny contains msg if {
    count(input.items) > 10
    msg := sprintf("too many items: %d", [count(input.items)])
}

later if {
    y := x + 1
    x := 2
    y > 2
}

all_positive if {
    every v in input.values {
        v > 0
    }
}
"#,
            )],
        );
        assert!(errs.is_empty(), "{errs}");
    }

    #[test]
    fn unsafe_variable_is_reported() {
        let errs = compile(Compiler::new(), &[("a.rego", "package a\n\np if {\n\tx == 1\n}\n")]);
        insta::assert_snapshot!(
            errs.to_string(),
            @"1 error occurred: a.rego:4: rego_unsafe_var_error: var x is unsafe"
        );
    }

    #[test]
    fn unsafe_head_variable_is_reported() {
        let errs = compile(
            Compiler::new(),
            &[("a.rego", "package a\n\nitems contains x if {\n\tinput.a == 1\n}\n")],
        );
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_UNSAFE_VAR_ERROR, "var x is unsafe".to_string())]
        );
    }

    #[test]
    fn undefined_function_and_arity() {
        let errs = compile(
            Compiler::new(),
            &[(
                "a.rego",
                "package a\n\np if {\n\tfoo(1)\n}\n\nq if {\n\tcount(1, 2, 3)\n}\n",
            )],
        );
        assert_eq!(
            messages(&errs),
            vec![
                (ids::CODE_TYPE_ERROR, "undefined function foo".to_string()),
                (
                    ids::CODE_TYPE_ERROR,
                    "count: arity mismatch: have 3 arguments, want 1".to_string()
                ),
            ]
        );
    }

    #[test]
    fn functions_resolve_through_imports() {
        let srcs = [
            ("lib.rego", "package lib\n\ndouble(x) := x * 2\n"),
            (
                "a.rego",
                "package a\n\nimport data.lib\n\np := lib.double(2)\n\nq := data.lib.double(3)\n",
            ),
        ];
        assert!(compile(Compiler::new().with_strict(true), &srcs).is_empty());

        let bad = [
            srcs[0],
            ("a.rego", "package a\n\nimport data.lib\n\np := lib.double(1, 2, 3)\n"),
        ];
        let errs = compile(Compiler::new(), &bad);
        assert_eq!(errs.len(), 1);
        assert!(errs.to_string().contains("lib.double: arity mismatch"));
    }

    #[test]
    fn conflicting_rule_kinds_stop_compilation() {
        let errs = compile(
            Compiler::new(),
            &[(
                "a.rego",
                "package a\n\np := 1\n\np contains 2 if true\n\nq if {\n\tz == 1\n}\n",
            )],
        );
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_TYPE_ERROR, "conflicting rules data.a.p found".to_string())]
        );
    }

    #[test]
    fn multiple_defaults_and_redeclaration() {
        let errs = compile(
            Compiler::new(),
            &[("a.rego", "package a\n\ndefault p := 1\n\ndefault p := 2\n")],
        );
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_TYPE_ERROR, "multiple default rules data.a.p found".to_string())]
        );

        let errs = compile(Compiler::new(), &[("a.rego", "package a\n\np := 1\n\np := 2\n")]);
        assert_eq!(errs.len(), 1);
        assert!(errs.to_string().contains("rule named p redeclared at a.rego:5"));
    }

    #[test]
    fn reassigning_a_var_in_one_body_is_rejected() {
        let errs = compile(
            Compiler::new(),
            &[("a.rego", "package a\n\nq if {\n\tx := 1\n\tx := 2\n}\n")],
        );
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_COMPILE_ERROR, "var x assigned above".to_string())]
        );
        assert_eq!(
            errs.iter().next().and_then(|e| e.location.as_ref()).map(|l| l.row),
            Some(5)
        );

        // Separate bodies and comprehensions each get their own scope.
        let errs = compile(
            Compiler::new(),
            &[(
                "a.rego",
                "package a\n\nq if {\n\tx := 1\n\tx > 0\n}\n\nr if {\n\tx := 2\n\tx > 0\n}\n\ns := [x | some x in input.xs]\n",
            )],
        );
        assert!(errs.is_empty(), "{errs}");
    }

    #[test]
    fn dotted_rule_heads_extend_the_package_path() {
        let errs = compile(
            Compiler::new().with_strict(true),
            &[(
                "a.rego",
                "package a\n\nlimits.cpu.max := 4\n\nroles.admin contains \"root\"\n\nok if limits.cpu.max > 2\n\nfirst := split(input.name, \".\")[0]\n",
            )],
        );
        assert!(errs.is_empty(), "{errs}");

        let errs = compile(
            Compiler::new(),
            &[("a.rego", "package a\n\nlimits := 1\n\nlimits.cpu := 2\n")],
        );
        assert_eq!(
            messages(&errs),
            vec![(
                ids::CODE_TYPE_ERROR,
                "rule data.a.limits conflicts with [data.a.limits.cpu]".to_string()
            )]
        );
    }

    #[test]
    fn every_reported_code_is_a_known_code() {
        let errs = compile(
            Compiler::new(),
            &[("a.rego", "package a\n\np if {\n\tx == 1\n\tfoo(1)\n}\n")],
        );
        assert!(!errs.is_empty());
        assert!(errs.iter().all(|e| ids::all_codes().contains(&e.code)));
    }

    #[test]
    fn recursion_is_reported_once_per_cycle() {
        let errs = compile(
            Compiler::new(),
            &[("a.rego", "package a\n\np if q\n\nq if p\n\nr if r\n")],
        );
        assert_eq!(
            messages(&errs),
            vec![
                (
                    ids::CODE_RECURSION_ERROR,
                    "rule data.a.p is recursive: data.a.p -> data.a.q -> data.a.p".to_string()
                ),
                (
                    ids::CODE_RECURSION_ERROR,
                    "rule data.a.r is recursive: data.a.r -> data.a.r".to_string()
                ),
            ]
        );
    }

    #[test]
    fn strict_mode_flags_unused_names() {
        let src = "package a\n\nimport data.lib.util\n\np if {\n\tx := 1\n\tinput.a\n}\n\nf(y) := 1\n";
        assert!(compile(Compiler::new(), &[("a.rego", src)]).is_empty());

        // Unused variables come from the body stage, which stops before the import check.
        let errs = compile(Compiler::new().with_strict(true), &[("a.rego", src)]);
        let msgs: Vec<String> = errs.iter().map(|e| e.message.clone()).collect();
        assert_eq!(
            msgs,
            vec![
                "assigned var x unused".to_string(),
                "unused argument y. (hint: use _ (wildcard variable) instead)".to_string(),
            ]
        );

        let errs = compile(
            Compiler::new().with_strict(true),
            &[("a.rego", "package a\n\nimport data.lib.util\n\np := 1\n")],
        );
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_COMPILE_ERROR, "import data.lib.util unused".to_string())]
        );
    }

    #[test]
    fn strict_mode_rejects_shadowing_input() {
        let errs = compile(
            Compiler::new().with_strict(true),
            &[("a.rego", "package a\n\np if {\n\tinput := 1\n\tinput > 0\n}\n")],
        );
        assert!(
            errs.iter()
                .any(|e| e.message.starts_with("variables must not shadow input"))
        );
    }

    #[test]
    fn duplicate_imports_are_rejected_in_v1() {
        let errs = compile(
            Compiler::new(),
            &[(
                "a.rego",
                "package a\n\nimport data.x.lib\nimport data.y.lib\n\np := lib.a\n",
            )],
        );
        assert_eq!(
            messages(&errs),
            vec![(
                ids::CODE_COMPILE_ERROR,
                "import must not shadow import data.y.lib".to_string()
            )]
        );
    }

    #[test]
    fn deprecated_builtins_depend_on_version_and_strictness() {
        let caps = Capabilities::for_this_version(RegoVersion::V0);
        let mods = modules(RegoVersion::V0, &[("a.rego", "package a\n\np {\n\tany([true])\n}\n")]);

        let mut lax = Compiler::new().with_capabilities(&caps);
        lax.compile(&mods);
        assert!(!lax.failed());

        let mut strict = Compiler::new().with_capabilities(&caps).with_strict(true);
        strict.compile(&mods);
        assert_eq!(
            strict.errors().iter().next().map(|e| e.message.as_str()),
            Some("deprecated built-in function calls in expression: any")
        );
    }

    #[test]
    fn print_needs_capability_only_when_enabled() {
        let src = [("a.rego", "package a\n\np if {\n\tprint(\"hi\")\n\tinput.x\n}\n")];
        let caps = Capabilities {
            builtins: Capabilities::for_this_version(RegoVersion::V1)
                .builtins
                .into_iter()
                .filter(|b| b.name != "print")
                .collect(),
            ..Capabilities::default()
        };

        let mut erased = Compiler::new()
            .with_capabilities(&caps)
            .with_enable_print_statements(false);
        erased.compile(&modules(RegoVersion::V1, &src));
        assert!(!erased.failed());

        let errs = compile(Compiler::new().with_capabilities(&caps), &src);
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_TYPE_ERROR, "undefined function print".to_string())]
        );
    }

    #[test]
    fn error_limit_truncates_and_flags() {
        let src = "package a\n\np if {\n\ta == 1\n}\n\nq if {\n\tb == 1\n}\n\nr if {\n\tc == 1\n}\n";
        let errs = compile(Compiler::new().with_error_limit(1), &[("a.rego", src)]);
        assert_eq!(errs.len(), 1);
        assert!(errs.limit_reached());

        let errs = compile(Compiler::new(), &[("a.rego", src)]);
        assert_eq!(errs.len(), 3);
        assert!(!errs.limit_reached());
    }

    #[test]
    fn annotations_reference_loaded_schemas() {
        let src = "package a\n\n# METADATA\n# schemas:\n#   - input: schema.input\np if input.usr == \"bob\"\n";

        let empty = SchemaSet::new();
        let errs = compile(
            Compiler::new()
                .with_schemas(&empty)
                .with_use_type_check_annotations(true),
            &[("a.rego", src)],
        );
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_TYPE_ERROR, "undefined schema: schema.input".to_string())]
        );

        let mut schemas = SchemaSet::new();
        schemas.insert(
            "schema.input",
            json!({"type": "object", "properties": {"user": {"type": "string"}}}),
        );
        let errs = compile(
            Compiler::new()
                .with_schemas(&schemas)
                .with_use_type_check_annotations(true),
            &[("a.rego", src)],
        );
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_TYPE_ERROR, "undefined ref: input.usr".to_string())]
        );

        // Annotation checking off: nothing to report.
        let errs = compile(Compiler::new().with_schemas(&empty), &[("a.rego", src)]);
        assert!(errs.is_empty());
    }

    #[test]
    fn root_schema_applies_without_annotations() {
        let mut schemas = SchemaSet::new();
        schemas.insert(
            crate::schema::SCHEMA_ROOT,
            json!({"type": "object", "properties": {"user": {"type": "string"}}}),
        );
        let errs = compile(
            Compiler::new()
                .with_schemas(&schemas)
                .with_use_type_check_annotations(true),
            &[("a.rego", "package a\n\nok if input.user == \"x\"\n\nbad if input.role == \"y\"\n")],
        );
        assert_eq!(
            messages(&errs),
            vec![(ids::CODE_TYPE_ERROR, "undefined ref: input.role".to_string())]
        );
    }
}
