use crate::error::LoadError;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

pub const REGO_EXT: &str = "rego";

/// Decides which walked entries are skipped.
///
/// Ignore patterns match an entry's base name (`*_test.rego`, `vendor`). They never apply to
/// the path supplied by the caller (depth 0), and an ignored directory is not descended into.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    ignore: Option<GlobSet>,
    only_rego: bool,
}

impl Filter {
    pub fn new(patterns: &[String]) -> Result<Self, LoadError> {
        Ok(Self {
            ignore: build_globset(patterns)?,
            only_rego: false,
        })
    }

    /// Also skip every file that is not a `.rego` source (at any depth).
    pub fn only_rego(mut self) -> Self {
        self.only_rego = true;
        self
    }

    pub fn excludes(&self, name: &str, is_dir: bool, depth: usize) -> bool {
        if self.only_rego && !is_dir && Utf8Path::new(name).extension() != Some(REGO_EXT) {
            return true;
        }
        depth >= 1 && self.ignore.as_ref().is_some_and(|set| set.is_match(name))
    }

    fn excludes_entry(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        self.excludes(&name, entry.file_type().is_dir(), entry.depth())
    }

    /// Files under `root` (or `root` itself) that survive the filter, in file name order.
    pub(crate) fn walk(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, LoadError> {
        std::fs::metadata(root).map_err(|e| LoadError::io(root, e))?;

        let mut out = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.excludes_entry(e));
        for entry in walker {
            let entry = entry.map_err(|source| LoadError::Walk {
                path: root.to_owned(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.into_path())
                .map_err(|p| LoadError::NonUtf8Path(p.display().to_string()))?;
            out.push(path);
        }
        Ok(out)
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, LoadError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        // Base names never contain a separator; keep `*` from pretending otherwise.
        let glob = GlobBuilder::new(p)
            .literal_separator(true)
            .build()
            .map_err(|source| invalid_glob(p, source))?;
        b.add(glob);
    }
    let set = b
        .build()
        .map_err(|source| invalid_glob(&patterns.join(","), source))?;
    Ok(Some(set))
}

fn invalid_glob(pattern: &str, source: globset::Error) -> LoadError {
    LoadError::InvalidGlob {
        pattern: pattern.to_string(),
        source,
    }
}

/// `path` with forward slashes, relative to `root`.
pub(crate) fn rel_path(root: &Utf8Path, path: &Utf8Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .as_str()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
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

    fn names(root: &Utf8Path, files: &[Utf8PathBuf]) -> Vec<String> {
        files.iter().map(|f| rel_path(root, f)).collect()
    }

    #[test]
    fn ignore_matches_base_names_and_prunes_directories() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        write_file(&root.join("a.rego"), "");
        write_file(&root.join("a_test.rego"), "");
        write_file(&root.join("vendor/b.rego"), "");
        write_file(&root.join("lib/c.rego"), "");
        write_file(&root.join("lib/notes.md"), "");

        let filter = Filter::new(&["*_test.rego".to_string(), "vendor".to_string()])
            .expect("filter");
        let files = filter.walk(&root).expect("walk");
        assert_eq!(names(&root, &files), vec!["a.rego", "lib/c.rego", "lib/notes.md"]);

        let files = filter.clone().only_rego().walk(&root).expect("walk");
        assert_eq!(names(&root, &files), vec!["a.rego", "lib/c.rego"]);
    }

    #[test]
    fn supplied_root_is_never_ignored() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp).join("vendor");
        write_file(&root.join("x.rego"), "");

        let filter = Filter::new(&["vendor".to_string()]).expect("filter");
        let files = filter.walk(&root).expect("walk");
        assert_eq!(names(&root, &files), vec!["x.rego"]);
    }

    #[test]
    fn only_rego_applies_to_a_supplied_file() {
        let filter = Filter::default().only_rego();
        assert!(filter.excludes("data.json", false, 0));
        assert!(!filter.excludes("policy.rego", false, 0));
        assert!(!filter.excludes("dir.json", true, 1));
    }

    #[test]
    fn missing_root_is_an_io_error() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp).join("nope");
        let err = Filter::default().walk(&root).expect_err("missing");
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = Filter::new(&["a[".to_string()]).expect_err("invalid glob");
        assert!(err.to_string().contains("invalid ignore pattern \"a[\""));
    }

    proptest! {
        #[test]
        fn depth_zero_is_never_ignored(name in "[a-z_.]{1,12}", is_dir in any::<bool>()) {
            let filter = Filter::new(&["*".to_string()]).expect("filter");
            prop_assert!(!filter.excludes(&name, is_dir, 0));
            prop_assert!(filter.excludes(&name, is_dir, 1));
        }
    }
}
