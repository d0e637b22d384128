use crate::Location;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The JSON document written by the `json` output format.
///
/// Field names are a compatibility contract: `errors[].message`, `errors[].code`,
/// `errors[].location.{file,row,col}`. An empty error list is omitted entirely.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Output {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<OutputError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputError {
    pub message: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    /// Extra context lines (for example the offending source line).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: JsonValue,
}

impl OutputError {
    /// An error that did not originate from a diagnostic (I/O failure, bad manifest, ...).
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: String::new(),
            location: None,
            details: JsonValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_output_serializes_without_errors_field() {
        let out = Output::default();
        assert_eq!(serde_json::to_value(&out).expect("serialize"), json!({}));
    }

    #[test]
    fn output_error_field_names_are_stable() {
        let out = Output {
            errors: vec![OutputError {
                message: "var x is unsafe".to_string(),
                code: "rego_unsafe_var_error".to_string(),
                location: Some(Location::new("policy.rego", 4, 3)),
                details: JsonValue::Null,
            }],
        };
        assert_eq!(
            serde_json::to_value(&out).expect("serialize"),
            json!({
                "errors": [{
                    "message": "var x is unsafe",
                    "code": "rego_unsafe_var_error",
                    "location": {"file": "policy.rego", "row": 4, "col": 3}
                }]
            })
        );
    }

    #[test]
    fn plain_error_omits_code_and_location() {
        let value = serde_json::to_value(OutputError::plain("boom")).expect("serialize");
        assert_eq!(value, json!({"message": "boom"}));
    }

    #[test]
    fn serialized_output_matches_generated_schema() {
        let schema = serde_json::to_value(schemars::schema_for!(Output)).expect("schema json");
        let validator = jsonschema::validator_for(&schema).expect("compile schema");
        let out = Output {
            errors: vec![
                OutputError::plain("boom"),
                OutputError {
                    message: "undefined function foo".to_string(),
                    code: "rego_type_error".to_string(),
                    location: Some(Location::new("a.rego", 1, 1)),
                    details: json!({"lines": ["foo(1)"]}),
                },
            ],
        };
        let value = serde_json::to_value(&out).expect("serialize");
        assert!(validator.is_valid(&value));
    }
}
