//! Rego front end: language versions, capabilities, parsing, and static compilation (no I/O).
//!
//! Input: policy source text (plus the file name used in diagnostics).
//! Output: parsed [`Module`]s and, after [`Compiler::compile`], an ordered list of [`Error`]s.
//!
//! Evaluation is out of scope; the compiler only proves that a module set is well formed.

#![forbid(unsafe_code)]

pub mod annotations;
pub mod ast;
pub mod builtins;
pub mod capabilities;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod version;

pub use annotations::{Annotations, Author, RelatedResource, SchemaAnnotation, SchemaSource};
pub use ast::{Import, Module, ModuleMap, Package, Rule, RuleHead, RuleKind};
pub use capabilities::{Builtin, BuiltinDecl, Capabilities};
pub use compiler::Compiler;
pub use error::{Error, ErrorDetails, Errors};
pub use parser::{parse_module, ParserOptions};
pub use schema::SchemaSet;
pub use version::RegoVersion;
