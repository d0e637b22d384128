//! Bundles: a directory tree, or a gzipped tarball of one.
//!
//! A bundle holds `.rego` modules and `data.json`/`data.yaml` documents with an optional
//! `.manifest` at its top. Signatures are never verified; `.signatures.json` is skipped.

use crate::error::LoadError;
use crate::filter::{Filter, REGO_EXT, rel_path};
use camino::Utf8Path;
use flate2::read::GzDecoder;
use globset::{GlobBuilder, GlobMatcher};
use regocheck_ast::{Capabilities, Errors, ModuleMap, ParserOptions, RegoVersion, parse_module};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::debug;

const MANIFEST_FILE: &str = ".manifest";
const SIGNATURES_FILE: &str = ".signatures.json";
const DATA_FILES: [&str; 3] = ["data.json", "data.yaml", "data.yml"];
const ARCHIVE_SUFFIXES: [&str; 2] = [".tar.gz", ".tgz"];

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub revision: String,
    /// Absent means the bundle owns all of `data`.
    #[serde(default)]
    pub roots: Option<Vec<String>>,
    #[serde(default)]
    pub rego_version: Option<i64>,
    /// Glob over bundle-relative file paths -> version number.
    #[serde(default)]
    pub file_rego_versions: BTreeMap<String, i64>,
}

impl Manifest {
    /// Declared roots without surrounding slashes; `[""]` when none are declared.
    pub fn roots(&self) -> Vec<String> {
        match &self.roots {
            Some(roots) => roots.iter().map(|r| r.trim_matches('/').to_string()).collect(),
            None => vec![String::new()],
        }
    }

    fn validate_roots(&self) -> Result<(), String> {
        let roots = self.roots();
        for (i, a) in roots.iter().enumerate() {
            for b in &roots[i + 1..] {
                if root_contains(a, b) || root_contains(b, a) {
                    return Err(format!("manifest has overlapped roots: '{a}' and '{b}'"));
                }
            }
        }
        Ok(())
    }
}

/// Whether slash-separated `path` falls under `root`.
fn root_contains(root: &str, path: &str) -> bool {
    root.is_empty()
        || path == root
        || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BundleOptions<'a> {
    /// Version for files the manifest says nothing about.
    pub rego_version: RegoVersion,
    pub capabilities: Option<&'a Capabilities>,
}

#[derive(Clone, Debug, Default)]
pub struct Bundle {
    pub manifest: Manifest,
    /// Keyed by `<bundle path>/<bundle-relative file>`.
    pub modules: ModuleMap,
    pub data: JsonValue,
}

/// A file inside a bundle: slash-separated path relative to the bundle root, and its bytes.
struct BundleFile {
    rel: String,
    bytes: Vec<u8>,
}

impl BundleFile {
    fn name(&self) -> &str {
        self.rel.rsplit('/').next().unwrap_or_default()
    }

    fn text(&self, bundle: &Utf8Path) -> Result<&str, LoadError> {
        std::str::from_utf8(&self.bytes)
            .map_err(|_| LoadError::bundle(bundle, format!("{}: file is not valid UTF-8", self.rel)))
    }
}

pub fn load_bundle(
    path: &Utf8Path,
    filter: &Filter,
    opts: &BundleOptions<'_>,
) -> Result<Bundle, LoadError> {
    let meta = std::fs::metadata(path).map_err(|e| LoadError::io(path, e))?;
    let files = if meta.is_dir() {
        directory_files(path, filter)?
    } else if ARCHIVE_SUFFIXES.iter().any(|s| path.as_str().ends_with(s)) {
        archive_files(path, filter)?
    } else {
        return Err(LoadError::bundle(
            path,
            "not a directory or a .tar.gz archive",
        ));
    };

    let manifest = match files.iter().find(|f| f.rel == MANIFEST_FILE) {
        Some(file) => serde_json::from_slice(&file.bytes)
            .map_err(|e| LoadError::bundle(path, format!("invalid manifest: {e}")))?,
        None => Manifest::default(),
    };
    manifest
        .validate_roots()
        .map_err(|msg| LoadError::bundle(path, msg))?;
    let versions = FileVersions::new(path, &manifest, opts.rego_version)?;
    let roots = manifest.roots();

    let mut modules = ModuleMap::new();
    let mut data = JsonValue::Object(Map::new());
    let mut errors = Vec::new();
    for file in &files {
        let rel = file.rel.as_str();
        if rel == MANIFEST_FILE || rel == SIGNATURES_FILE {
            continue;
        }

        if Utf8Path::new(rel).extension() == Some(REGO_EXT) {
            let source = file.text(path)?;
            let key = format!("{}/{}", path.as_str().trim_end_matches('/'), rel);
            let parser_opts = ParserOptions {
                rego_version: versions.for_file(rel),
                capabilities: opts.capabilities,
                process_annotations: true,
            };
            match parse_module(&key, source, &parser_opts) {
                Ok(module) => {
                    let pkg = module.package.path.join("/");
                    if !roots.iter().any(|r| root_contains(r, &pkg)) {
                        return Err(LoadError::bundle(
                            path,
                            format!(
                                "manifest roots {roots:?} do not permit 'package {}' in module file '{rel}'",
                                module.package.path.join(".")
                            ),
                        ));
                    }
                    modules.insert(key, module);
                }
                Err(errs) => errors.extend(errs.into_vec()),
            }
        } else if DATA_FILES.contains(&file.name()) {
            let dir = Utf8Path::new(rel)
                .parent()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            let doc = read_data(path, file)?;
            check_data_roots(&roots, &dir, &doc).map_err(|msg| LoadError::bundle(path, msg))?;
            merge_at(&mut data, &dir, doc).map_err(|msg| LoadError::bundle(path, msg))?;
        }
    }

    if !errors.is_empty() {
        return Err(LoadError::Parse(Errors::new(errors, false)));
    }
    debug!(
        bundle = %path,
        revision = %manifest.revision,
        modules = modules.len(),
        "loaded bundle"
    );
    Ok(Bundle {
        manifest,
        modules,
        data,
    })
}

fn directory_files(root: &Utf8Path, filter: &Filter) -> Result<Vec<BundleFile>, LoadError> {
    let mut out = Vec::new();
    for file in filter.walk(root)? {
        let bytes = std::fs::read(&file).map_err(|e| LoadError::io(&file, e))?;
        out.push(BundleFile {
            rel: rel_path(root, &file),
            bytes,
        });
    }
    Ok(out)
}

/// Regular files of a `.tar.gz` bundle, filtered like a directory walk, in path order.
fn archive_files(archive: &Utf8Path, filter: &Filter) -> Result<Vec<BundleFile>, LoadError> {
    let file = std::fs::File::open(archive).map_err(|e| LoadError::io(archive, e))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    let mut out = Vec::new();
    for entry in tar.entries().map_err(|e| LoadError::io(archive, e))? {
        let mut entry = entry.map_err(|e| LoadError::io(archive, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry.path().map_err(|e| LoadError::io(archive, e))?;
        let rel = match entry_path.to_str() {
            Some(p) => p.trim_start_matches("./").trim_start_matches('/').to_string(),
            None => return Err(LoadError::NonUtf8Path(entry_path.display().to_string())),
        };
        if rel.is_empty() || excluded_member(filter, &rel) {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| LoadError::io(archive, e))?;
        out.push(BundleFile { rel, bytes });
    }
    out.sort_by(|a, b| a.rel.cmp(&b.rel));
    debug!(archive = %archive, files = out.len(), "read bundle archive");
    Ok(out)
}

/// Apply the filter to every component of an archive member, as a walk would.
fn excluded_member(filter: &Filter, rel: &str) -> bool {
    let parts: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
    parts
        .iter()
        .enumerate()
        .any(|(i, part)| filter.excludes(part, i + 1 < parts.len(), i + 1))
}

fn read_data(bundle: &Utf8Path, file: &BundleFile) -> Result<JsonValue, LoadError> {
    let text = file.text(bundle)?;
    let parsed = if file.rel.ends_with(".json") {
        serde_json::from_str(text).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    };
    parsed.map_err(|msg| {
        LoadError::bundle(bundle, format!("{}: invalid data document: {msg}", file.rel))
    })
}

fn check_data_roots(roots: &[String], dir: &str, doc: &JsonValue) -> Result<(), String> {
    let permitted = |p: &str| roots.iter().any(|r| root_contains(r, p));
    let denied = |p: &str| format!("manifest roots {roots:?} do not permit data at path '/{p}'");
    if !dir.is_empty() {
        return if permitted(dir) { Ok(()) } else { Err(denied(dir)) };
    }
    match doc {
        JsonValue::Object(map) => match map.keys().find(|k| !permitted(k)) {
            Some(k) => Err(denied(k)),
            None => Ok(()),
        },
        _ if permitted("") => Ok(()),
        _ => Err(denied("")),
    }
}

/// Merge `doc` into `data` under the slash-separated `dir`.
fn merge_at(data: &mut JsonValue, dir: &str, doc: JsonValue) -> Result<(), String> {
    let mut node = data;
    for seg in dir.split('/').filter(|s| !s.is_empty()) {
        let JsonValue::Object(map) = node else {
            return Err(format!("data at '/{dir}' conflicts with a non-object value"));
        };
        node = map
            .entry(seg.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
    merge_values(node, doc, dir)
}

fn merge_values(dst: &mut JsonValue, src: JsonValue, at: &str) -> Result<(), String> {
    if dst.as_object().is_some_and(Map::is_empty) {
        *dst = src;
        return Ok(());
    }
    match (dst, src) {
        (JsonValue::Object(d), JsonValue::Object(s)) => {
            for (k, v) in s {
                let child = if at.is_empty() { k.clone() } else { format!("{at}/{k}") };
                match d.get_mut(&k) {
                    Some(existing) => merge_values(existing, v, &child)?,
                    None => {
                        d.insert(k, v);
                    }
                }
            }
            Ok(())
        }
        _ => Err(format!("merge error: conflicting data at '/{at}'")),
    }
}

struct FileVersions {
    default: RegoVersion,
    globs: Vec<(GlobMatcher, RegoVersion)>,
}

impl FileVersions {
    fn new(root: &Utf8Path, manifest: &Manifest, fallback: RegoVersion) -> Result<Self, LoadError> {
        let default = match manifest.rego_version {
            Some(n) => manifest_version(root, n)?,
            None => fallback,
        };
        let mut globs = Vec::new();
        for (pattern, n) in &manifest.file_rego_versions {
            let glob = GlobBuilder::new(pattern.trim_start_matches('/'))
                .literal_separator(true)
                .build()
                .map_err(|e| LoadError::bundle(root, format!("invalid file_rego_versions key: {e}")))?;
            globs.push((glob.compile_matcher(), manifest_version(root, *n)?));
        }
        Ok(Self { default, globs })
    }

    fn for_file(&self, rel: &str) -> RegoVersion {
        let rel = rel.trim_start_matches('/');
        self.globs
            .iter()
            .find(|(g, _)| g.is_match(rel))
            .map_or(self.default, |(_, v)| *v)
    }
}

fn manifest_version(root: &Utf8Path, n: i64) -> Result<RegoVersion, LoadError> {
    RegoVersion::from_manifest_number(n)
        .ok_or_else(|| LoadError::bundle(root, format!("unknown rego_version {n} in manifest")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde_json::json;
    use tempfile::TempDir;

    fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path")
    }

    fn write_file(path: &Utf8Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, contents).expect("write file");
    }

    fn load(root: &Utf8Path) -> Result<Bundle, LoadError> {
        load_bundle(root, &Filter::default(), &BundleOptions::default())
    }

    #[test]
    fn two_module_bundle_is_keyed_by_bundle_path() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp).join("bundle");
        write_file(
            &root.join(".manifest"),
            r#"{"revision": "r1", "roots": ["authz", "lib"]}"#,
        );
        write_file(&root.join(".signatures.json"), "not json at all");
        write_file(&root.join("authz/main.rego"), "package authz\n\nallow := true\n");
        write_file(&root.join("lib/util.rego"), "package lib.util\n\nx := 1\n");
        write_file(&root.join("authz/data.json"), r#"{"admins": ["alice"]}"#);

        let bundle = load(&root).expect("load bundle");
        assert_eq!(bundle.manifest.revision, "r1");
        let keys: Vec<String> = bundle.modules.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                format!("{root}/authz/main.rego"),
                format!("{root}/lib/util.rego"),
            ]
        );
        assert_eq!(bundle.data, json!({"authz": {"admins": ["alice"]}}));
    }

    #[test]
    fn packages_outside_roots_are_rejected() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(&root.join(".manifest"), r#"{"roots": ["authz"]}"#);
        write_file(&root.join("other.rego"), "package other\n\np := 1\n");

        let err = load(&root).expect_err("outside roots");
        assert!(
            err.to_string().contains("do not permit 'package other'"),
            "{err}"
        );
    }

    #[test]
    fn data_outside_roots_is_rejected() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(&root.join(".manifest"), r#"{"roots": ["authz"]}"#);
        write_file(&root.join("data.json"), r#"{"users": []}"#);

        let err = load(&root).expect_err("outside roots");
        assert!(err.to_string().contains("do not permit data at path '/users'"), "{err}");
    }

    #[test]
    fn overlapping_roots_are_rejected() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(&root.join(".manifest"), r#"{"roots": ["a", "a/b"]}"#);

        let err = load(&root).expect_err("overlap");
        assert!(err.to_string().contains("overlapped roots"), "{err}");
    }

    #[test]
    fn manifest_versions_apply_per_file() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(
            &root.join(".manifest"),
            r#"{"rego_version": 0, "file_rego_versions": {"/v1/*.rego": 1}}"#,
        );
        write_file(&root.join("legacy.rego"), "package legacy\n\np {\n\ttrue\n}\n");
        write_file(&root.join("v1/new.rego"), "package new\n\np if {\n\ttrue\n}\n");

        let bundle = load(&root).expect("load");
        let versions: Vec<RegoVersion> = bundle.modules.values().map(|m| m.rego_version).collect();
        assert_eq!(versions, vec![RegoVersion::V0, RegoVersion::V1]);
    }

    #[test]
    fn unknown_manifest_version_is_rejected() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(&root.join(".manifest"), r#"{"rego_version": 7}"#);

        let err = load(&root).expect_err("bad version");
        assert!(err.to_string().contains("unknown rego_version 7"));
    }

    #[test]
    fn ignore_filter_applies_inside_bundles() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(&root.join("a.rego"), "package a\n\np := 1\n");
        write_file(&root.join("broken_test.rego"), "package\n");

        let filter = Filter::new(&["*_test.rego".to_string()]).expect("filter");
        let bundle = load_bundle(&root, &filter, &BundleOptions::default()).expect("load");
        assert_eq!(bundle.modules.len(), 1);
    }

    fn write_archive(path: &Utf8Path, files: &[(&str, &str)]) {
        let file = std::fs::File::create(path).expect("create archive");
        let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .expect("append entry");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip");
    }

    #[test]
    fn archive_bundles_load_like_directories() {
        let tmp = TempDir::new().expect("temp dir");
        let archive = utf8_root(&tmp).join("bundle.tar.gz");
        write_archive(
            &archive,
            &[
                (".manifest", r#"{"revision": "r7", "roots": ["authz"]}"#),
                ("authz/allow.rego", "package authz\n\nallow := true\n"),
                ("authz/allow_test.rego", "package\n"),
                ("authz/data.json", r#"{"admins": ["alice"]}"#),
            ],
        );

        let filter = Filter::new(&["*_test.rego".to_string()]).expect("filter");
        let bundle = load_bundle(&archive, &filter, &BundleOptions::default()).expect("load");
        assert_eq!(bundle.manifest.revision, "r7");
        let keys: Vec<String> = bundle.modules.keys().cloned().collect();
        assert_eq!(keys, vec![format!("{archive}/authz/allow.rego")]);
        assert_eq!(bundle.data, json!({"authz": {"admins": ["alice"]}}));
    }

    #[test]
    fn archive_bundles_enforce_manifest_roots() {
        let tmp = TempDir::new().expect("temp dir");
        let archive = utf8_root(&tmp).join("bundle.tgz");
        write_archive(
            &archive,
            &[
                (".manifest", r#"{"roots": ["authz"]}"#),
                ("other/p.rego", "package other\n\np := 1\n"),
            ],
        );

        let err = load(&archive).expect_err("outside roots");
        assert!(err.to_string().contains("do not permit 'package other'"), "{err}");
    }

    #[test]
    fn corrupt_archives_and_plain_files_are_rejected() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(&root.join("bundle.tar.gz"), "not gzip");
        write_file(&root.join("policy.rego"), "package a\n");

        let err = load(&root.join("bundle.tar.gz")).expect_err("corrupt archive");
        assert!(matches!(err, LoadError::Io { .. }), "{err}");
        let err = load(&root.join("policy.rego")).expect_err("file");
        assert!(err.to_string().ends_with("not a directory or a .tar.gz archive"));
    }

    #[test]
    fn yaml_data_merges_with_json_data() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(&root.join("a/data.json"), r#"{"x": 1}"#);
        write_file(&root.join("a/b/data.yaml"), "y: 2\n");

        let bundle = load(&root).expect("load");
        assert_eq!(bundle.data, json!({"a": {"x": 1, "b": {"y": 2}}}));
    }
}
