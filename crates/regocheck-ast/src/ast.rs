//! Parsed module representation.
//!
//! The model is deliberately small: it keeps what static validation needs (names, bindings,
//! references, calls, locations) and nothing an evaluator would.

use crate::annotations::Annotations;
use crate::version::RegoVersion;
use regocheck_types::Location;
use std::collections::BTreeMap;
use std::fmt;

/// Module name -> parsed module. Names are unique keys; inserting an existing name replaces it.
pub type ModuleMap = BTreeMap<String, Module>;

#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    /// File the module was parsed from (used in every diagnostic location).
    pub file: String,
    pub package: Package,
    pub imports: Vec<Import>,
    pub rules: Vec<Rule>,
    /// Annotations attached to the `package` statement.
    pub annotations: Option<Annotations>,
    pub rego_version: RegoVersion,
}

impl Module {
    /// The declared module name: the package path rooted at `data`.
    pub fn name(&self) -> String {
        self.package.data_path()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Package {
    pub path: Vec<String>,
    pub location: Location,
}

impl Package {
    pub fn data_path(&self) -> String {
        let mut out = String::from("data");
        for seg in &self.path {
            out.push('.');
            out.push_str(seg);
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub path: Vec<String>,
    pub alias: Option<String>,
    pub location: Location,
}

impl Import {
    /// Keyword imports (`future.keywords...`, `rego.v1`) only toggle syntax.
    pub fn is_keyword_import(&self) -> bool {
        matches!(self.path.first().map(String::as_str), Some("future") | Some("rego"))
    }

    /// The local name the import binds, if any.
    pub fn name(&self) -> Option<&str> {
        if self.is_keyword_import() {
            return None;
        }
        if let Some(alias) = &self.alias {
            return Some(alias.as_str());
        }
        self.path.last().map(String::as_str)
    }

    pub fn path_string(&self) -> String {
        self.path.join(".")
    }
}

/// Shape of a rule, used to detect conflicting definitions of the same path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    Complete,
    MultiValue,
    PartialObject,
    Function(usize),
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Complete => f.write_str("complete"),
            RuleKind::MultiValue => f.write_str("multi-value"),
            RuleKind::PartialObject => f.write_str("partial object"),
            RuleKind::Function(n) => write!(f, "function/{n}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuleHead {
    pub name: String,
    pub args: Option<Vec<Term>>,
    pub key: Option<Term>,
    pub value: Option<Term>,
    /// Declared with `:=` rather than `=`.
    pub assign: bool,
    /// Declared with `contains`.
    pub contains: bool,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub default: bool,
    pub head: RuleHead,
    /// Empty when the rule has no body.
    pub body: Vec<Literal>,
    pub uses_if: bool,
    pub else_rule: Option<Box<Rule>>,
    pub annotations: Option<Annotations>,
    pub location: Location,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        let head = &self.head;
        if let Some(args) = &head.args {
            return RuleKind::Function(args.len());
        }
        match (&head.key, &head.value) {
            (Some(_), Some(_)) => RuleKind::PartialObject,
            (Some(_), None) => RuleKind::MultiValue,
            _ => RuleKind::Complete,
        }
    }

    /// This rule followed by its `else` branches.
    pub fn chain(&self) -> impl Iterator<Item = &Rule> {
        std::iter::successors(Some(self), |r| r.else_rule.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    pub negated: bool,
    pub expr: Expr,
    pub with: Vec<WithModifier>,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WithModifier {
    pub target: Term,
    pub value: Term,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Term(Term),
    /// `lhs := rhs`
    Assign { lhs: Term, rhs: Term },
    /// `lhs = rhs`
    Unify { lhs: Term, rhs: Term },
    /// `some x, y`
    SomeDecl { vars: Vec<(String, Location)> },
    /// `some [key,] value in collection`
    SomeIn {
        key: Option<Term>,
        value: Term,
        collection: Term,
    },
    /// `every [key,] value in domain { body }`
    Every {
        key: Option<Term>,
        value: Term,
        domain: Term,
        body: Vec<Literal>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    pub value: Value,
    pub location: Location,
}

impl Term {
    pub fn new(value: Value, location: Location) -> Self {
        Self { value, location }
    }

    pub fn as_var(&self) -> Option<&str> {
        match &self.value {
            Value::Var(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Var(String),
    Ref(Ref),
    Call { func: String, args: Vec<Term> },
    /// A reference into a call result: `split(s, ".")[0]`.
    CallRef {
        call: Box<Term>,
        path: Vec<RefSegment>,
    },
    Array(Vec<Term>),
    Set(Vec<Term>),
    Object(Vec<(Term, Term)>),
    ArrayCompr { head: Box<Term>, body: Vec<Literal> },
    SetCompr { head: Box<Term>, body: Vec<Literal> },
    ObjectCompr {
        key: Box<Term>,
        value: Box<Term>,
        body: Vec<Literal>,
    },
}

/// A reference rooted at a variable: `input.user.roles[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Ref {
    pub root: String,
    pub path: Vec<RefSegment>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RefSegment {
    Field(String),
    Index(Term),
}

impl RefSegment {
    /// Static key of the segment (`.name` or `["name"]`), if known before evaluation.
    pub fn static_key(&self) -> Option<&str> {
        match self {
            RefSegment::Field(name) => Some(name),
            RefSegment::Index(Term {
                value: Value::String(s),
                ..
            }) => Some(s),
            RefSegment::Index(_) => None,
        }
    }
}

impl Ref {
    /// Root plus the leading run of statically known segments.
    pub fn static_prefix(&self) -> Vec<&str> {
        let mut out = vec![self.root.as_str()];
        for seg in &self.path {
            match seg.static_key() {
                Some(key) => out.push(key),
                None => break,
            }
        }
        out
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for seg in &self.path {
            match seg {
                RefSegment::Field(name) => write!(f, ".{name}")?,
                RefSegment::Index(term) => match &term.value {
                    Value::String(s) => write!(f, "[{s:?}]")?,
                    Value::Number(n) => write!(f, "[{n}]")?,
                    Value::Var(v) => write!(f, "[{v}]")?,
                    _ => f.write_str("[...]")?,
                },
            }
        }
        Ok(())
    }
}

/// Visit every term nested in `term` (including `term` itself), without entering
/// comprehension or `every` bodies.
pub fn walk_terms<'a>(term: &'a Term, visit: &mut dyn FnMut(&'a Term)) {
    visit(term);
    match &term.value {
        Value::Ref(r) => {
            for seg in &r.path {
                if let RefSegment::Index(t) = seg {
                    walk_terms(t, visit);
                }
            }
        }
        Value::Call { args, .. } => args.iter().for_each(|a| walk_terms(a, visit)),
        Value::CallRef { call, path } => {
            walk_terms(call, visit);
            for seg in path {
                if let RefSegment::Index(t) = seg {
                    walk_terms(t, visit);
                }
            }
        }
        Value::Array(items) | Value::Set(items) => {
            items.iter().for_each(|t| walk_terms(t, visit))
        }
        Value::Object(pairs) => {
            for (k, v) in pairs {
                walk_terms(k, visit);
                walk_terms(v, visit);
            }
        }
        _ => {}
    }
}

/// Like [`walk_terms`], but also descends into comprehensions.
pub fn walk_terms_deep<'a>(term: &'a Term, visit: &mut dyn FnMut(&'a Term)) {
    walk_terms(term, &mut |t| {
        visit(t);
        match &t.value {
            Value::ArrayCompr { head, body } | Value::SetCompr { head, body } => {
                walk_terms_deep(head, visit);
                walk_body_deep(body, visit);
            }
            Value::ObjectCompr { key, value, body } => {
                walk_terms_deep(key, visit);
                walk_terms_deep(value, visit);
                walk_body_deep(body, visit);
            }
            _ => {}
        }
    });
}

/// Every term of every literal in `body`, including `every` bodies and `with` modifiers.
pub fn walk_body_deep<'a>(body: &'a [Literal], visit: &mut dyn FnMut(&'a Term)) {
    for lit in body {
        for t in lit.terms() {
            walk_terms_deep(t, visit);
        }
        if let Expr::Every { body, .. } = &lit.expr {
            walk_body_deep(body, visit);
        }
    }
}

/// Name of a variable term, or the root variable of a reference.
pub fn var_name(term: &Term) -> Option<&str> {
    match &term.value {
        Value::Var(name) => Some(name),
        Value::Ref(r) => Some(&r.root),
        _ => None,
    }
}

/// Every variable name occurring in a term (refs contribute their root and index vars).
pub fn term_vars(term: &Term) -> Vec<(String, Location)> {
    let mut out = Vec::new();
    walk_terms(term, &mut |t| match &t.value {
        Value::Var(name) => out.push((name.clone(), t.location.clone())),
        Value::Ref(r) => out.push((r.root.clone(), t.location.clone())),
        _ => {}
    });
    out
}

impl Literal {
    /// Top-level terms of the literal, in source order.
    pub fn terms(&self) -> Vec<&Term> {
        let mut out = Vec::new();
        match &self.expr {
            Expr::Term(t) => out.push(t),
            Expr::Assign { lhs, rhs } | Expr::Unify { lhs, rhs } => {
                out.push(lhs);
                out.push(rhs);
            }
            Expr::SomeDecl { .. } => {}
            Expr::SomeIn {
                key,
                value,
                collection,
            } => {
                out.extend(key.iter());
                out.push(value);
                out.push(collection);
            }
            Expr::Every {
                key, value, domain, ..
            } => {
                out.extend(key.iter());
                out.push(value);
                out.push(domain);
            }
        }
        for w in &self.with {
            out.push(&w.target);
            out.push(&w.value);
        }
        out
    }
}
