//! Capabilities: the built-ins, keywords, and features a compiler may rely on.
//!
//! The serialized form is the usual capabilities JSON document, so hand-written files
//! (including custom built-in declarations) round-trip through [`Capabilities`].

use crate::builtins;
use crate::version::RegoVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

pub const FEATURE_REGO_V1: &str = "rego_v1";
pub const FEATURE_REGO_V1_IMPORT: &str = "rego_v1_import";

pub const FUTURE_KEYWORDS: [&str; 4] = ["contains", "every", "if", "in"];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuiltinDecl {
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variadic: Option<JsonValue>,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Builtin {
    pub name: String,
    #[serde(default)]
    pub decl: BuiltinDecl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infix: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

impl Builtin {
    pub fn arity(&self) -> usize {
        self.decl.args.len()
    }

    pub fn is_variadic(&self) -> bool {
        self.decl.variadic.is_some()
    }

    fn from_spec(spec: &builtins::BuiltinSpec) -> Self {
        Builtin {
            name: spec.name.to_string(),
            decl: BuiltinDecl {
                kind: function_type(),
                args: (0..spec.arity).map(|_| json!({"type": "any"})).collect(),
                result: (!spec.variadic).then(|| json!({"type": "any"})),
                variadic: spec.variadic.then(|| json!({"type": "any"})),
            },
            infix: spec.infix.map(str::to_string),
            deprecated: spec.deprecated,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub builtins: Vec<Builtin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub future_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl Capabilities {
    /// Capabilities of this build for the given language version.
    ///
    /// Deprecated built-ins are left out for versions that enforce v1 rules.
    pub fn for_this_version(version: RegoVersion) -> Self {
        let builtins = builtins::registry()
            .iter()
            .filter(|b| !(b.deprecated && version.enforces_v1()))
            .map(Builtin::from_spec)
            .collect();

        let mut features = vec![FEATURE_REGO_V1_IMPORT.to_string()];
        if version == RegoVersion::V1 {
            features.push(FEATURE_REGO_V1.to_string());
        }

        Capabilities {
            builtins,
            future_keywords: FUTURE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            features,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn builtin(&self, name: &str) -> Option<&Builtin> {
        self.builtins.iter().find(|b| b.name == name)
    }

    pub fn allows_future_keyword(&self, kw: &str) -> bool {
        self.future_keywords.iter().any(|k| k == kw)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}
