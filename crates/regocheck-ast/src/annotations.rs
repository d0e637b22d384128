//! `# METADATA` comment blocks.
//!
//! A block is a run of consecutive comment lines whose first line is exactly `METADATA`;
//! the remaining lines are YAML. The block attaches to the package or rule that starts on the
//! line immediately after it.

use regocheck_types::Location;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

const METADATA_MARKER: &str = "METADATA";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotationScope {
    Rule,
    Document,
    Package,
    Subpackages,
}

impl AnnotationScope {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "rule" => Some(AnnotationScope::Rule),
            "document" => Some(AnnotationScope::Document),
            "package" => Some(AnnotationScope::Package),
            "subpackages" => Some(AnnotationScope::Subpackages),
            _ => None,
        }
    }
}

/// Where the schema for an annotated path comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaSource {
    /// Key into the loaded schema set, e.g. `schema.input` or `schema.acl-schema`.
    Ref(String),
    Inline(JsonValue),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SchemaAnnotation {
    /// Annotated document path, e.g. `["input"]` or `["data", "acl"]`.
    pub path: Vec<String>,
    pub source: SchemaSource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotations {
    pub scope: AnnotationScope,
    pub title: Option<String>,
    pub description: Option<String>,
    pub entrypoint: bool,
    pub schemas: Vec<SchemaAnnotation>,
    pub related_resources: Vec<RelatedResource>,
    pub authors: Vec<Author>,
    pub organizations: Vec<String>,
    pub custom: BTreeMap<String, JsonValue>,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelatedResource {
    pub reference: String,
    pub description: Option<String>,
}

/// At least one of `name` and `email` is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAnnotations {
    scope: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    entrypoint: bool,
    #[serde(default)]
    schemas: Vec<BTreeMap<String, JsonValue>>,
    #[serde(default)]
    custom: BTreeMap<String, JsonValue>,
    #[serde(default)]
    related_resources: Vec<JsonValue>,
    #[serde(default)]
    authors: Vec<JsonValue>,
    #[serde(default)]
    organizations: Vec<String>,
}

/// A raw comment line as seen by the lexer: text after `#`, and its position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub row: u32,
    pub col: u32,
}

/// A METADATA block located in the source, not yet attached to a statement.
#[derive(Clone, Debug)]
pub(crate) struct MetadataBlock {
    pub(crate) yaml: String,
    pub(crate) start: Location,
    /// Row of the last comment line in the block.
    pub(crate) end_row: u32,
}

/// Group comments into METADATA blocks.
pub(crate) fn metadata_blocks(file: &str, comments: &[Comment]) -> Vec<MetadataBlock> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < comments.len() {
        if comments[i].text.trim() != METADATA_MARKER {
            i += 1;
            continue;
        }
        let start = Location::new(file, comments[i].row, comments[i].col);
        let mut end_row = comments[i].row;
        let mut lines = Vec::new();
        let mut j = i + 1;
        while j < comments.len() && comments[j].row == end_row + 1 {
            let text = comments[j].text.strip_prefix(' ').unwrap_or(&comments[j].text);
            lines.push(text.to_string());
            end_row = comments[j].row;
            j += 1;
        }
        out.push(MetadataBlock {
            yaml: lines.join("\n"),
            start,
            end_row,
        });
        i = j;
    }
    out
}

/// Parse a block's YAML. `default_scope` applies when the block does not set `scope`.
pub(crate) fn parse_block(
    block: &MetadataBlock,
    default_scope: AnnotationScope,
) -> Result<Annotations, String> {
    let raw: RawAnnotations = if block.yaml.trim().is_empty() {
        RawAnnotations::default()
    } else {
        serde_yaml::from_str(&block.yaml).map_err(|e| format!("yaml: {e}"))?
    };

    let scope = match raw.scope.as_deref() {
        None => default_scope,
        Some(s) => AnnotationScope::parse(s).ok_or_else(|| format!("invalid scope: '{s}'"))?,
    };

    let mut schemas = Vec::new();
    for entry in raw.schemas {
        for (path, source) in entry {
            schemas.push(SchemaAnnotation {
                path: parse_annotation_path(&path)?,
                source: parse_schema_source(source)?,
            });
        }
    }

    let related_resources = raw
        .related_resources
        .into_iter()
        .map(parse_related_resource)
        .collect::<Result<Vec<_>, _>>()?;
    let authors = raw
        .authors
        .into_iter()
        .map(parse_author)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Annotations {
        scope,
        title: raw.title,
        description: raw.description,
        entrypoint: raw.entrypoint,
        schemas,
        related_resources,
        authors,
        organizations: raw.organizations,
        custom: raw.custom,
        location: block.start.clone(),
    })
}

/// `https://...` or `{ref: https://..., description: ...}`.
fn parse_related_resource(value: JsonValue) -> Result<RelatedResource, String> {
    let (reference, description) = match value {
        JsonValue::String(s) => (s, None),
        JsonValue::Object(mut map) => {
            let reference = match map.remove("ref") {
                Some(JsonValue::String(s)) => s,
                _ => return Err("invalid related-resource: ref must be a string".to_string()),
            };
            let description = match map.remove("description") {
                None => None,
                Some(JsonValue::String(s)) => Some(s),
                Some(_) => {
                    return Err("invalid related-resource: description must be a string".to_string());
                }
            };
            if let Some(key) = map.keys().next() {
                return Err(format!("invalid related-resource: unknown key '{key}'"));
            }
            (reference, description)
        }
        other => return Err(format!("invalid related-resource: {other}")),
    };
    let reference = reference.trim().to_string();
    if !reference.contains("://") {
        return Err(format!("invalid related-resource: '{reference}' is not a URL"));
    }
    Ok(RelatedResource {
        reference,
        description,
    })
}

/// `Jane Doe <jane@example.com>`, or `{name: ..., email: ...}`.
fn parse_author(value: JsonValue) -> Result<Author, String> {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    let author = match value {
        JsonValue::String(s) => {
            let s = s.trim();
            match s.strip_suffix('>').and_then(|rest| rest.rsplit_once('<')) {
                Some((name, email)) => Author {
                    name: non_empty(name),
                    email: non_empty(email),
                },
                None => Author {
                    name: non_empty(s),
                    email: None,
                },
            }
        }
        JsonValue::Object(map) => {
            let field = |key: &str| map.get(key).and_then(JsonValue::as_str).and_then(non_empty);
            Author {
                name: field("name"),
                email: field("email"),
            }
        }
        other => return Err(format!("invalid author: {other}")),
    };
    if author.name.is_none() && author.email.is_none() {
        return Err("invalid author: author must have either name or email".to_string());
    }
    Ok(author)
}

fn parse_annotation_path(path: &str) -> Result<Vec<String>, String> {
    let segs: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
    match segs.first().map(String::as_str) {
        Some("input") | Some("data") if segs.iter().all(|s| !s.is_empty()) => Ok(segs),
        _ => Err(format!(
            "invalid document reference in schemas: '{path}' (must begin with input or data)"
        )),
    }
}

fn parse_schema_source(source: JsonValue) -> Result<SchemaSource, String> {
    match source {
        JsonValue::String(s) => normalize_schema_ref(&s).map(SchemaSource::Ref),
        JsonValue::Object(_) => Ok(SchemaSource::Inline(source)),
        other => Err(format!("invalid schema reference: {other}")),
    }
}

/// `schema.a.b` and `schema["a-b"]` both become dotted keys rooted at `schema`.
fn normalize_schema_ref(s: &str) -> Result<String, String> {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("schema") else {
        return Err(format!("invalid schema reference: '{s}' (must begin with schema)"));
    };
    let mut key = String::from("schema");
    let mut rest = rest;
    while !rest.is_empty() {
        if let Some(r) = rest.strip_prefix('.') {
            let end = r.find(['.', '[']).unwrap_or(r.len());
            key.push('.');
            key.push_str(&r[..end]);
            rest = &r[end..];
        } else if let Some(r) = rest.strip_prefix("[\"") {
            let end = r
                .find("\"]")
                .ok_or_else(|| format!("invalid schema reference: '{s}'"))?;
            key.push('.');
            key.push_str(&r[..end]);
            rest = &r[end + 2..];
        } else {
            return Err(format!("invalid schema reference: '{s}'"));
        }
    }
    Ok(key)
}
