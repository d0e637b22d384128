use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Reference of a schema loaded from a single file. It also serves as the input schema for
/// rules without an `input` schema annotation.
pub const SCHEMA_ROOT: &str = "schema";

/// Schema documents keyed by their reference (`schema`, `schema.input`, `schema.acl-schema`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaSet {
    by_ref: BTreeMap<String, JsonValue>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, schema: JsonValue) {
        self.by_ref.insert(reference.into(), schema);
    }

    pub fn get(&self, reference: &str) -> Option<&JsonValue> {
        self.by_ref.get(reference)
    }

    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }

    pub fn refs(&self) -> impl Iterator<Item = &str> {
        self.by_ref.keys().map(String::as_str)
    }
}
