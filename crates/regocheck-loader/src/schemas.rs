use crate::error::LoadError;
use crate::filter::{Filter, rel_path};
use camino::Utf8Path;
use regocheck_ast::SchemaSet;
use regocheck_ast::schema::SCHEMA_ROOT;
use serde_json::Value as JsonValue;
use tracing::debug;

/// Load the schema table for annotation type checking.
///
/// - absent or empty path: empty set
/// - a file: one schema under `schema`
/// - a directory: every `*.json` below it, `dir/acl/input.json` becoming `schema.acl.input`
pub fn load_schemas(path: Option<&Utf8Path>) -> Result<SchemaSet, LoadError> {
    let mut set = SchemaSet::new();
    let Some(path) = path.filter(|p| !p.as_str().is_empty()) else {
        return Ok(set);
    };

    let meta = std::fs::metadata(path).map_err(|e| LoadError::io(path, e))?;
    if !meta.is_dir() {
        set.insert(SCHEMA_ROOT, read_schema(path)?);
        return Ok(set);
    }

    for file in Filter::default().walk(path)? {
        if file.extension() != Some("json") {
            continue;
        }
        let rel = rel_path(path, &file);
        let stem = rel.trim_end_matches(".json");
        let mut reference = String::from(SCHEMA_ROOT);
        for seg in stem.split('/') {
            reference.push('.');
            reference.push_str(seg);
        }
        set.insert(reference, read_schema(&file)?);
    }
    debug!(path = %path, schemas = set.len(), "loaded schemas");
    Ok(set)
}

fn read_schema(path: &Utf8Path) -> Result<JsonValue, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    let value: JsonValue = serde_json::from_str(&text)
        .map_err(|e| LoadError::schema(path, format!("invalid JSON: {e}")))?;
    jsonschema::validator_for(&value)
        .map_err(|e| LoadError::schema(path, format!("invalid JSON Schema: {e}")))?;
    Ok(value)
}
