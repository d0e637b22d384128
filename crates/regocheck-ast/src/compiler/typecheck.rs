//! Annotation type check.
//!
//! Every `schemas` entry must name a loaded schema. Rules then have their `input` references
//! checked against the input schema in effect: the rule's own annotation, else the package
//! annotation, else the root schema of the schema set.

use crate::annotations::{Annotations, SchemaSource};
use crate::ast::{self, ModuleMap, Ref, Rule, Term, Value};
use crate::error::{Error, ErrorSink};
use crate::schema::{SCHEMA_ROOT, SchemaSet};
use regocheck_types::Location;
use serde_json::Value as JsonValue;

/// Bound on `$ref` indirections followed while resolving one schema node.
const MAX_REF_DEPTH: usize = 32;

pub(crate) fn check(modules: &ModuleMap, schemas: Option<&SchemaSet>, sink: &mut ErrorSink) {
    let root_input = schemas.and_then(|s| s.get(SCHEMA_ROOT));
    for module in modules.values() {
        let pkg_input = module
            .annotations
            .as_ref()
            .and_then(|a| input_schema(a, schemas, sink));

        for rule in &module.rules {
            if sink.halted() {
                return;
            }
            let rule_input = rule
                .annotations
                .as_ref()
                .and_then(|a| input_schema(a, schemas, sink));
            let Some(schema) = rule_input.or(pkg_input).or(root_input) else {
                continue;
            };
            for branch in rule.chain() {
                check_input_refs(branch, schema, sink);
            }
        }
    }
}

/// Report undefined schema references; return the schema annotated for `input`, if any.
fn input_schema<'x>(
    ann: &'x Annotations,
    schemas: Option<&'x SchemaSet>,
    sink: &mut ErrorSink,
) -> Option<&'x JsonValue> {
    let mut input = None;
    for entry in &ann.schemas {
        let schema = match &entry.source {
            SchemaSource::Inline(v) => Some(v),
            SchemaSource::Ref(r) => {
                let found = schemas.and_then(|set| set.get(r));
                if found.is_none() {
                    sink.push(Error::type_error(
                        &ann.location,
                        format!("undefined schema: {r}"),
                    ));
                }
                found
            }
        };
        if entry.path == ["input"] {
            input = schema.or(input);
        }
    }
    input
}

fn check_input_refs(rule: &Rule, schema: &JsonValue, sink: &mut ErrorSink) {
    let mut refs: Vec<(&Ref, &Location)> = Vec::new();
    for t in rule.head.key.iter().chain(rule.head.value.iter()) {
        ast::walk_terms_deep(t, &mut |x| push_input_ref(x, &mut refs));
    }
    ast::walk_body_deep(&rule.body, &mut |x| push_input_ref(x, &mut refs));

    for (r, loc) in refs {
        if let Err(shown) = lookup(schema, r) {
            sink.push(Error::type_error(loc, format!("undefined ref: {shown}")));
        }
    }
}

fn push_input_ref<'r>(x: &'r Term, out: &mut Vec<(&'r Ref, &'r Location)>) {
    if let Value::Ref(r) = &x.value {
        if r.root == "input" {
            out.push((r, &x.location));
        }
    }
}

fn deref<'j>(root: &'j JsonValue, node: &'j JsonValue) -> &'j JsonValue {
    let mut node = node;
    for _ in 0..MAX_REF_DEPTH {
        let next = node
            .get("$ref")
            .and_then(JsonValue::as_str)
            .and_then(|r| r.strip_prefix('#'))
            .and_then(|pointer| root.pointer(pointer));
        match next {
            Some(n) => node = n,
            None => break,
        }
    }
    node
}

/// Walk `r` through the schema. `Err` carries the reference up to the first undefined key.
fn lookup(root: &JsonValue, r: &Ref) -> Result<(), String> {
    let mut node = root;
    let mut shown = r.root.clone();
    for seg in &r.path {
        let current = deref(root, node);
        if ["allOf", "anyOf", "oneOf"].iter().any(|k| current.get(k).is_some()) {
            return Ok(());
        }
        match seg.static_key() {
            Some(key) => {
                shown.push('.');
                shown.push_str(key);
                let props = current.get("properties");
                if let Some(next) = props.and_then(|p| p.get(key)) {
                    node = next;
                    continue;
                }
                match current.get("additionalProperties") {
                    Some(extra @ JsonValue::Object(_)) => {
                        node = extra;
                        continue;
                    }
                    Some(JsonValue::Bool(true)) => return Ok(()),
                    _ => {}
                }
                return if props.is_some() { Err(shown) } else { Ok(()) };
            }
            None => match current.get("items") {
                Some(items) => {
                    shown.push_str("[_]");
                    node = items;
                }
                None => return Ok(()),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RefSegment;
    use serde_json::json;

    fn input_ref(fields: &[&str]) -> Ref {
        Ref {
            root: "input".to_string(),
            path: fields
                .iter()
                .map(|f| RefSegment::Field(f.to_string()))
                .collect(),
        }
    }

    fn schema() -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "user": { "$ref": "#/definitions/user" },
                "labels": { "type": "object", "additionalProperties": { "type": "string" } }
            },
            "definitions": {
                "user": {
                    "type": "object",
                    "properties": { "name": { "type": "string" } }
                }
            }
        })
    }

    #[test]
    fn known_paths_resolve_through_refs() {
        let s = schema();
        assert!(lookup(&s, &input_ref(&["user", "name"])).is_ok());
        assert!(lookup(&s, &input_ref(&["labels", "team"])).is_ok());
    }

    #[test]
    fn unknown_property_reports_prefix() {
        let s = schema();
        assert_eq!(
            lookup(&s, &input_ref(&["user", "nmae"])),
            Err("input.user.nmae".to_string())
        );
    }

    #[test]
    fn unconstrained_schema_accepts_anything() {
        let s = json!({"type": "object"});
        assert!(lookup(&s, &input_ref(&["anything", "goes"])).is_ok());
    }
}
