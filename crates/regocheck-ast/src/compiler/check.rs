//! Per-rule body analysis.
//!
//! Safety: a variable used as an input must be bound by some other literal of the same body.
//! Literals are scheduled repeatedly in source order until none becomes ready; the inputs of
//! whatever is left are unsafe. Comprehension and `every` bodies are checked as nested bodies
//! that see the enclosing bindings.
//!
//! The same walk resolves calls (user functions first, then the capability set), records the
//! rules each rule depends on, and tracks which imports are referenced.

use super::rules::RuleTable;
use crate::ast::{self, Expr, Import, Literal, Module, ModuleMap, RefSegment, Rule, Term, Value};
use crate::builtins;
use crate::capabilities::{Builtin, Capabilities};
use crate::error::{Error, ErrorSink};
use regocheck_types::Location;
use std::collections::{BTreeMap, BTreeSet};

type Vars = Vec<(String, Location)>;
type Bound = BTreeSet<String>;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Options {
    pub(crate) enable_print: bool,
    pub(crate) strict: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Outcome {
    /// Rule path -> rule paths it references.
    pub(crate) deps: BTreeMap<String, BTreeSet<String>>,
    /// Module key -> import names referenced in that module.
    pub(crate) used_imports: BTreeMap<String, BTreeSet<String>>,
}

pub(crate) fn check_modules(
    modules: &ModuleMap,
    table: &RuleTable<'_>,
    caps: &Capabilities,
    opts: Options,
    sink: &mut ErrorSink,
) -> Outcome {
    let mut outcome = Outcome::default();
    for (key, module) in modules {
        let mut cx = ModuleCx::new(module, table, caps, opts, sink);
        for rule in &module.rules {
            if cx.sink.halted() {
                break;
            }
            cx.rule(rule);
        }
        let ModuleCx {
            deps, used_imports, ..
        } = cx;
        for (path, d) in deps {
            outcome.deps.entry(path).or_default().extend(d);
        }
        outcome.used_imports.insert(key.clone(), used_imports);
        if sink.halted() {
            break;
        }
    }
    outcome
}

enum Callee<'c> {
    Function { path: String, arity: usize },
    Builtin(&'c Builtin),
}

fn expr_terms(expr: &Expr) -> Vec<&Term> {
    match expr {
        Expr::Term(t) => vec![t],
        Expr::Assign { lhs, rhs } | Expr::Unify { lhs, rhs } => vec![lhs, rhs],
        Expr::SomeDecl { .. } => Vec::new(),
        Expr::SomeIn {
            key,
            value,
            collection,
        } => key.iter().chain([value, collection]).collect(),
        Expr::Every {
            key, value, domain, ..
        } => key.iter().chain([value, domain]).collect(),
    }
}

/// Variables in pattern position, including globals (used for shadowing checks).
fn raw_pattern_vars(t: &Term, acc: &mut Vars) {
    match &t.value {
        Value::Var(n) if n != "_" => acc.push((n.clone(), t.location.clone())),
        Value::Array(items) => items.iter().for_each(|i| raw_pattern_vars(i, acc)),
        Value::Object(pairs) => pairs.iter().for_each(|(_, v)| raw_pattern_vars(v, acc)),
        _ => {}
    }
}

fn tally<'t>(t: &'t Term, counts: &mut BTreeMap<&'t str, usize>) {
    ast::walk_terms_deep(t, &mut |x| {
        if let Some(n) = ast::var_name(x) {
            *counts.entry(n).or_default() += 1;
        }
    });
}

fn tally_body<'t>(body: &'t [Literal], counts: &mut BTreeMap<&'t str, usize>) {
    ast::walk_body_deep(body, &mut |x| {
        if let Some(n) = ast::var_name(x) {
            *counts.entry(n).or_default() += 1;
        }
    });
}

fn shadows_root(name: &str) -> bool {
    name == "input" || name == "data"
}

struct ModuleCx<'a, 's> {
    module: &'a Module,
    table: &'a RuleTable<'a>,
    caps: &'a Capabilities,
    opts: Options,
    pkg: String,
    imports: BTreeMap<String, &'a Import>,
    used_imports: BTreeSet<String>,
    deps: BTreeMap<String, BTreeSet<String>>,
    sink: &'s mut ErrorSink,
}

impl<'a, 's> ModuleCx<'a, 's> {
    fn new(
        module: &'a Module,
        table: &'a RuleTable<'a>,
        caps: &'a Capabilities,
        opts: Options,
        sink: &'s mut ErrorSink,
    ) -> Self {
        let imports = module
            .imports
            .iter()
            .filter_map(|imp| imp.name().map(|n| (n.to_string(), imp)))
            .collect();
        Self {
            module,
            table,
            caps,
            opts,
            pkg: module.package.data_path(),
            imports,
            used_imports: BTreeSet::new(),
            deps: BTreeMap::new(),
            sink,
        }
    }

    // =========================================
    // Rules
    // =========================================

    fn rule(&mut self, rule: &'a Rule) {
        let path = format!("{}.{}", self.pkg, rule.head.name);
        let mut deps = BTreeSet::new();

        if rule.default {
            if let Some(value) = &rule.head.value {
                let mut has_var = false;
                ast::walk_terms_deep(value, &mut |t| has_var |= ast::var_name(t).is_some());
                if has_var {
                    self.sink.push(Error::compile(
                        &value.location,
                        "default rule value cannot contain var",
                    ));
                }
                self.visit_term(value, &Bound::new(), &mut deps);
            }
        } else {
            for branch in rule.chain() {
                self.rule_branch(branch, &mut deps);
            }
        }

        self.deps.entry(path).or_default().extend(deps);
    }

    fn rule_branch(&mut self, r: &Rule, deps: &mut BTreeSet<String>) {
        let mut arg_vars = Vars::new();
        for arg in r.head.args.iter().flatten() {
            self.pattern_vars(arg, &mut arg_vars);
        }
        let bound: Bound = arg_vars.into_iter().map(|(n, _)| n).collect();

        let body_bound = self.body(&r.body, &bound, deps);
        let heads: Vec<&Term> = r.head.key.iter().chain(r.head.value.iter()).collect();
        self.head_terms(&heads, &body_bound, deps);

        if self.opts.strict || self.module.rego_version.enforces_v1() {
            self.variable_checks(r);
        }
    }

    /// Variables shadowing `input` or `data`; in strict mode also unused arguments and unused
    /// assigned or declared variables.
    fn variable_checks(&mut self, r: &Rule) {
        let strict = self.opts.strict;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for t in r.head.args.iter().flatten() {
            tally(t, &mut counts);
        }
        for t in r.head.key.iter().chain(r.head.value.iter()) {
            tally(t, &mut counts);
        }
        tally_body(&r.body, &mut counts);
        let count = |name: &str| counts.get(name).copied().unwrap_or(0);

        let mut errors = Vec::new();
        let mut arg_vars = Vars::new();
        for arg in r.head.args.iter().flatten() {
            raw_pattern_vars(arg, &mut arg_vars);
        }
        for (name, loc) in arg_vars {
            if shadows_root(&name) {
                errors.push(shadow_error(&loc, &name));
            } else if strict && count(&name) <= 1 {
                errors.push(Error::compile(
                    &loc,
                    format!("unused argument {name}. (hint: use _ (wildcard variable) instead)"),
                ));
            }
        }

        for lit in &r.body {
            match &lit.expr {
                Expr::Assign { lhs, .. } => {
                    let mut vars = Vars::new();
                    raw_pattern_vars(lhs, &mut vars);
                    for (name, loc) in vars {
                        if shadows_root(&name) {
                            errors.push(shadow_error(&loc, &name));
                        } else if strict && count(&name) <= 1 {
                            errors.push(Error::compile(&loc, format!("assigned var {name} unused")));
                        }
                    }
                }
                Expr::SomeDecl { vars } => {
                    for (name, loc) in vars {
                        if shadows_root(name) {
                            errors.push(shadow_error(loc, name));
                        } else if strict && count(name) == 0 {
                            errors.push(Error::compile(loc, format!("declared var {name} unused")));
                        }
                    }
                }
                Expr::SomeIn { key, value, .. } => {
                    let mut vars = Vars::new();
                    for t in key.iter().chain([value]) {
                        raw_pattern_vars(t, &mut vars);
                    }
                    for (name, loc) in vars.into_iter().filter(|(n, _)| shadows_root(n)) {
                        errors.push(shadow_error(&loc, &name));
                    }
                }
                _ => {}
            }
        }

        for err in errors {
            self.sink.push(err);
        }
    }

    // =========================================
    // Bodies
    // =========================================

    /// Check a body given the variables bound around it; returns the variables bound after it.
    fn body(&mut self, lits: &[Literal], outer: &Bound, deps: &mut BTreeSet<String>) -> Bound {
        self.redeclarations(lits);
        let mut candidates = Bound::new();
        for lit in lits {
            self.potential_outputs(lit, &mut candidates);
        }

        let mut bound = outer.clone();
        let mut pending: Vec<&Literal> = lits.iter().filter(|l| !self.is_erased(l)).collect();
        loop {
            let mut waiting = Vec::new();
            let mut progressed = false;
            for lit in pending {
                match self.try_literal(lit, &bound, &candidates) {
                    Ok(outs) => {
                        self.literal_nested(lit, &bound, deps);
                        bound.extend(outs.into_iter().map(|(n, _)| n));
                        progressed = true;
                    }
                    Err(_) => waiting.push(lit),
                }
            }
            pending = waiting;
            if !progressed || pending.is_empty() {
                break;
            }
        }

        let mut reported = BTreeSet::new();
        for lit in pending {
            self.literal_nested(lit, &bound, deps);
            if let Err(missing) = self.try_literal(lit, &bound, &candidates) {
                for (name, loc) in missing {
                    if reported.insert(name.clone()) {
                        self.sink.push(Error::unsafe_var(&loc, &name));
                    }
                }
            }
        }
        bound
    }

    /// A variable may be declared (`:=` or `some x`) at most once per body.
    fn redeclarations(&mut self, lits: &[Literal]) {
        let mut declared = BTreeSet::new();
        for lit in lits {
            let mut vars = Vars::new();
            match &lit.expr {
                Expr::Assign { lhs, .. } => raw_pattern_vars(lhs, &mut vars),
                Expr::SomeDecl { vars: decl } => vars.extend(decl.iter().cloned()),
                _ => continue,
            }
            for (name, loc) in vars {
                if shadows_root(&name) {
                    continue;
                }
                if !declared.insert(name.clone()) {
                    self.sink
                        .push(Error::compile(&loc, format!("var {name} assigned above")));
                }
            }
        }
    }

    /// `print(...)` literals are dropped when print statements are disabled.
    fn is_erased(&self, lit: &Literal) -> bool {
        !self.opts.enable_print
            && matches!(&lit.expr, Expr::Term(Term { value: Value::Call { func, .. }, .. }) if func == builtins::PRINT)
    }

    /// `Ok(outputs)` when every input of the literal is bound, `Err(missing)` otherwise.
    fn try_literal(&self, lit: &Literal, bound: &Bound, candidates: &Bound) -> Result<Vars, Vars> {
        let mut needs = Vars::new();
        let mut outs = Vars::new();
        for w in &lit.with {
            self.inputs(&w.value, candidates, &mut needs);
        }

        if lit.negated {
            for t in expr_terms(&lit.expr) {
                self.inputs(t, candidates, &mut needs);
                self.ref_outputs(t, &mut needs);
            }
            return settle(needs, outs, bound);
        }

        match &lit.expr {
            Expr::Term(t) => match self.split_output(t) {
                Some((ins, out)) => {
                    for a in ins {
                        self.inputs(a, candidates, &mut needs);
                        self.ref_outputs(a, &mut outs);
                    }
                    self.pattern_inputs(out, candidates, &mut needs);
                    self.pattern_vars(out, &mut outs);
                    self.ref_outputs(out, &mut outs);
                }
                None => {
                    self.inputs(t, candidates, &mut needs);
                    self.ref_outputs(t, &mut outs);
                }
            },
            Expr::Assign { lhs, rhs } => {
                self.inputs(rhs, candidates, &mut needs);
                self.ref_outputs(rhs, &mut outs);
                self.pattern_inputs(lhs, candidates, &mut needs);
                self.pattern_vars(lhs, &mut outs);
            }
            Expr::Unify { lhs, rhs } => {
                let (mut l_in, mut r_in) = (Vars::new(), Vars::new());
                let (mut l_pat, mut r_pat) = (Vars::new(), Vars::new());
                self.inputs(lhs, candidates, &mut l_in);
                self.inputs(rhs, candidates, &mut r_in);
                self.pattern_inputs(lhs, candidates, &mut l_pat);
                self.pattern_inputs(rhs, candidates, &mut r_pat);
                let all_bound = |vars: &Vars| vars.iter().all(|(n, _)| bound.contains(n));
                if all_bound(&r_in) && all_bound(&l_pat) {
                    self.pattern_vars(lhs, &mut outs);
                } else if all_bound(&l_in) && all_bound(&r_pat) {
                    self.pattern_vars(rhs, &mut outs);
                } else {
                    needs.extend(l_in);
                    needs.extend(r_in);
                }
                self.ref_outputs(lhs, &mut outs);
                self.ref_outputs(rhs, &mut outs);
            }
            Expr::SomeDecl { .. } => {}
            Expr::SomeIn {
                key,
                value,
                collection,
            } => {
                self.inputs(collection, candidates, &mut needs);
                self.ref_outputs(collection, &mut outs);
                for t in key.iter().chain([value]) {
                    self.pattern_inputs(t, candidates, &mut needs);
                    self.pattern_vars(t, &mut outs);
                }
            }
            Expr::Every { domain, .. } => self.inputs(domain, candidates, &mut needs),
        }
        settle(needs, outs, bound)
    }

    /// Calls, references and nested bodies inside a literal, given what is bound before it.
    fn literal_nested(&mut self, lit: &Literal, bound: &Bound, deps: &mut BTreeSet<String>) {
        for t in lit.terms() {
            self.visit_term(t, bound, deps);
        }
        if let Expr::Every {
            key, value, body, ..
        } = &lit.expr
        {
            let mut vars = Vars::new();
            for t in key.iter().chain([value]) {
                self.pattern_vars(t, &mut vars);
            }
            let mut inner = bound.clone();
            inner.extend(vars.into_iter().map(|(n, _)| n));
            self.body(body, &inner, deps);
        }
    }

    /// Head terms (rule heads, comprehension heads) must only use bound variables.
    fn head_terms(&mut self, terms: &[&Term], bound: &Bound, deps: &mut BTreeSet<String>) {
        let mut reported = BTreeSet::new();
        for t in terms {
            let mut needs = Vars::new();
            self.inputs(t, &Bound::new(), &mut needs);
            self.ref_outputs(t, &mut needs);
            for (name, loc) in needs {
                if !bound.contains(&name) && reported.insert(name.clone()) {
                    self.sink.push(Error::unsafe_var(&loc, &name));
                }
            }
            self.visit_term(t, bound, deps);
        }
    }

    fn visit_term(&mut self, t: &Term, bound: &Bound, deps: &mut BTreeSet<String>) {
        ast::walk_terms(t, &mut |x| self.visit_one(x, bound, deps));
    }

    fn visit_one(&mut self, x: &Term, bound: &Bound, deps: &mut BTreeSet<String>) {
        match &x.value {
            Value::Var(name) => self.note_name(name, deps),
            Value::Ref(r) => self.note_ref(r, deps),
            Value::Call { func, args } => self.check_call(func, args.len(), &x.location, deps),
            Value::ArrayCompr { head, body } | Value::SetCompr { head, body } => {
                let inner = self.body(body, bound, deps);
                self.head_terms(&[head.as_ref()], &inner, deps);
            }
            Value::ObjectCompr { key, value, body } => {
                let inner = self.body(body, bound, deps);
                self.head_terms(&[key.as_ref(), value.as_ref()], &inner, deps);
            }
            _ => {}
        }
    }

    // =========================================
    // Variable classification
    // =========================================

    /// Names that never need binding: roots, imports, and rules of the enclosing package.
    fn is_global(&self, name: &str) -> bool {
        name == "input"
            || name == "data"
            || self.imports.contains_key(name)
            || self.table.defines(&format!("{}.{name}", self.pkg))
    }

    fn is_safe_name(&self, name: &str) -> bool {
        name == "_" || self.is_global(name)
    }

    /// Variables a term needs bound before it can be evaluated.
    fn inputs(&self, t: &Term, candidates: &Bound, acc: &mut Vars) {
        match &t.value {
            Value::Var(n) => {
                if !self.is_safe_name(n) {
                    acc.push((n.clone(), t.location.clone()));
                }
            }
            Value::Ref(r) => {
                if !self.is_safe_name(&r.root) {
                    acc.push((r.root.clone(), t.location.clone()));
                }
                for seg in &r.path {
                    if let RefSegment::Index(i) = seg {
                        if i.as_var().is_none() {
                            self.inputs(i, candidates, acc);
                        }
                    }
                }
            }
            Value::Call { args, .. } => args.iter().for_each(|a| self.inputs(a, candidates, acc)),
            Value::CallRef { call, path } => {
                self.inputs(call, candidates, acc);
                for seg in path {
                    if let RefSegment::Index(i) = seg {
                        if i.as_var().is_none() {
                            self.inputs(i, candidates, acc);
                        }
                    }
                }
            }
            Value::Array(items) | Value::Set(items) => {
                items.iter().for_each(|i| self.inputs(i, candidates, acc))
            }
            Value::Object(pairs) => {
                for (k, v) in pairs {
                    self.inputs(k, candidates, acc);
                    self.inputs(v, candidates, acc);
                }
            }
            // A comprehension waits for sibling literals that bind names it mentions.
            Value::ArrayCompr { .. } | Value::SetCompr { .. } | Value::ObjectCompr { .. } => {
                ast::walk_terms_deep(t, &mut |x| {
                    if let Some(n) = ast::var_name(x) {
                        if candidates.contains(n) {
                            acc.push((n.to_string(), x.location.clone()));
                        }
                    }
                });
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
        }
    }

    /// Variables a pattern binds.
    fn pattern_vars(&self, t: &Term, acc: &mut Vars) {
        match &t.value {
            Value::Var(n) if !self.is_safe_name(n) => acc.push((n.clone(), t.location.clone())),
            Value::Array(items) => items.iter().for_each(|i| self.pattern_vars(i, acc)),
            Value::Object(pairs) => pairs.iter().for_each(|(_, v)| self.pattern_vars(v, acc)),
            _ => {}
        }
    }

    /// Inputs of the non-variable parts of a pattern.
    fn pattern_inputs(&self, t: &Term, candidates: &Bound, acc: &mut Vars) {
        match &t.value {
            Value::Var(_) => {}
            Value::Array(items) => items
                .iter()
                .for_each(|i| self.pattern_inputs(i, candidates, acc)),
            Value::Object(pairs) => {
                for (k, v) in pairs {
                    self.inputs(k, candidates, acc);
                    self.pattern_inputs(v, candidates, acc);
                }
            }
            _ => self.inputs(t, candidates, acc),
        }
    }

    /// Variables bound by indexing: `i` in `xs[i]`.
    fn ref_outputs(&self, t: &Term, acc: &mut Vars) {
        ast::walk_terms(t, &mut |x| {
            let path = match &x.value {
                Value::Ref(r) => &r.path,
                Value::CallRef { path, .. } => path,
                _ => return,
            };
            for seg in path {
                if let RefSegment::Index(i) = seg {
                    if let Some(n) = i.as_var() {
                        if !self.is_safe_name(n) {
                            acc.push((n.to_string(), i.location.clone()));
                        }
                    }
                }
            }
        });
    }

    fn potential_outputs(&self, lit: &Literal, acc: &mut Bound) {
        let mut vars = Vars::new();
        match &lit.expr {
            Expr::Assign { lhs, .. } => self.pattern_vars(lhs, &mut vars),
            Expr::Unify { lhs, rhs } => {
                self.pattern_vars(lhs, &mut vars);
                self.pattern_vars(rhs, &mut vars);
            }
            Expr::SomeIn { key, value, .. } => {
                for t in key.iter().chain([value]) {
                    self.pattern_vars(t, &mut vars);
                }
            }
            Expr::Term(t) => {
                if let Some((_, out)) = self.split_output(t) {
                    self.pattern_vars(out, &mut vars);
                }
            }
            Expr::SomeDecl { .. } | Expr::Every { .. } => {}
        }
        for t in expr_terms(&lit.expr) {
            self.ref_outputs(t, &mut vars);
        }
        acc.extend(vars.into_iter().map(|(n, _)| n));
    }

    /// A call with one argument more than its arity binds its result to the last argument.
    fn split_output<'t>(&self, t: &'t Term) -> Option<(&'t [Term], &'t Term)> {
        let Value::Call { func, args } = &t.value else {
            return None;
        };
        let arity = match self.resolve(func)? {
            Callee::Function { arity, .. } => arity,
            Callee::Builtin(b) if !b.is_variadic() => b.arity(),
            Callee::Builtin(_) => return None,
        };
        (args.len() == arity + 1).then(|| (&args[..arity], &args[arity]))
    }

    // =========================================
    // Calls and references
    // =========================================

    fn function_path(&self, func: &str) -> Option<String> {
        if func.starts_with("data.") {
            return Some(func.to_string());
        }
        let (head, rest) = match func.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (func, None),
        };
        if let Some(imp) = self.imports.get(head) {
            if imp.path.first().map(String::as_str) != Some("data") {
                return None;
            }
            let mut path = imp.path_string();
            if let Some(rest) = rest {
                path.push('.');
                path.push_str(rest);
            }
            return Some(path);
        }
        Some(format!("{}.{func}", self.pkg))
    }

    fn resolve(&self, func: &str) -> Option<Callee<'a>> {
        if let Some(path) = self.function_path(func) {
            if let Some(arity) = self.table.function_arity(&path) {
                return Some(Callee::Function { path, arity });
            }
        }
        self.caps.builtin(func).map(Callee::Builtin)
    }

    fn check_call(&mut self, func: &str, argc: usize, loc: &Location, deps: &mut BTreeSet<String>) {
        if func == builtins::PRINT && !self.opts.enable_print {
            return;
        }
        let head = func.split_once('.').map_or(func, |(h, _)| h);
        if self.imports.contains_key(head) {
            self.used_imports.insert(head.to_string());
        }

        match self.resolve(func) {
            Some(Callee::Function { path, arity }) => {
                self.check_arity(func, argc, arity, loc);
                deps.insert(path);
            }
            Some(Callee::Builtin(b)) => {
                if !b.is_variadic() {
                    self.check_arity(func, argc, b.arity(), loc);
                }
                if b.deprecated && (self.opts.strict || self.module.rego_version.enforces_v1()) {
                    self.sink.push(Error::type_error(
                        loc,
                        format!("deprecated built-in function calls in expression: {func}"),
                    ));
                }
            }
            None => self
                .sink
                .push(Error::type_error(loc, format!("undefined function {func}"))),
        }
    }

    fn check_arity(&mut self, func: &str, argc: usize, arity: usize, loc: &Location) {
        if argc != arity && argc != arity + 1 {
            self.sink.push(Error::type_error(
                loc,
                format!("{func}: arity mismatch: have {argc} arguments, want {arity}"),
            ));
        }
    }

    fn note_name(&mut self, name: &str, deps: &mut BTreeSet<String>) {
        if self.imports.contains_key(name) {
            self.used_imports.insert(name.to_string());
            return;
        }
        let path = format!("{}.{name}", self.pkg);
        if self.table.has_rule(&path) {
            deps.insert(path);
        } else {
            deps.extend(self.table.paths_under(&path).map(str::to_string));
        }
    }

    fn note_ref(&mut self, r: &ast::Ref, deps: &mut BTreeSet<String>) {
        let segs = r.static_prefix();
        if r.root == "data" {
            self.note_data_path(&segs, deps);
            return;
        }
        if let Some(imp) = self.imports.get(r.root.as_str()).copied() {
            self.used_imports.insert(r.root.clone());
            if imp.path.first().map(String::as_str) == Some("data") {
                let mut full: Vec<&str> = imp.path.iter().map(String::as_str).collect();
                full.extend(&segs[1..]);
                self.note_data_path(&full, deps);
            }
            return;
        }
        if self.is_local_rule_root(&r.root) {
            let pkg = self.pkg.clone();
            let mut full: Vec<&str> = pkg.split('.').collect();
            full.extend(&segs);
            self.note_data_path(&full, deps);
        }
    }

    fn is_local_rule_root(&self, name: &str) -> bool {
        self.table.defines(&format!("{}.{name}", self.pkg))
    }

    /// Depend on the longest rule path prefixing `segs`, or on every rule below it.
    fn note_data_path(&self, segs: &[&str], deps: &mut BTreeSet<String>) {
        for n in (2..=segs.len()).rev() {
            let path = segs[..n].join(".");
            if self.table.has_rule(&path) {
                deps.insert(path);
                return;
            }
        }
        let prefix = segs.join(".");
        deps.extend(self.table.paths_under(&prefix).map(str::to_string));
    }
}

fn settle(needs: Vars, outs: Vars, bound: &Bound) -> Result<Vars, Vars> {
    let missing: Vars = needs.into_iter().filter(|(n, _)| !bound.contains(n)).collect();
    if missing.is_empty() {
        Ok(outs)
    } else {
        Err(missing)
    }
}

fn shadow_error(loc: &Location, name: &str) -> Error {
    Error::compile(
        loc,
        format!("variables must not shadow {name} (use a different variable name)"),
    )
}
