//! Fixture corpus discovery.
//!
//! The corpus is a flat directory of `*.txt` fixture files. Discovery is
//! deterministic: candidates are sorted by path before filtering so `--limit`
//! always selects the same prefix of the corpus.

use std::fs;
use std::path::{Path, PathBuf};

use citecompat_error::{CompatError, Result};
use tracing::{debug, info};

use crate::fixture::{Fixture, load_fixture};

/// Extension of fixture files.
pub const FIXTURE_EXTENSION: &str = "txt";

/// Which part of the corpus to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusFilter {
    /// Keep only fixtures whose file name starts with this prefix.
    pub category: Option<String>,
    /// Maximum number of files; 0 means unlimited.
    pub limit: usize,
}

impl CorpusFilter {
    fn accepts(&self, path: &Path) -> bool {
        let Some(prefix) = self.category.as_deref() else {
            return true;
        };
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(prefix))
    }
}

/// List the fixture files under `dir`, sorted, filtered, then limited.
///
/// # Errors
///
/// Returns [`CompatError::CorpusNotFound`] when `dir` is not a directory and
/// an I/O error when it cannot be listed.
pub fn discover_fixture_files(dir: &Path, filter: &CorpusFilter) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CompatError::CorpusNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_fixture_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    files.retain(|path| filter.accepts(path));
    if filter.limit > 0 {
        files.truncate(filter.limit);
    }

    debug!(
        target: "citecompat",
        dir = %dir.display(),
        count = files.len(),
        category = filter.category.as_deref().unwrap_or("*"),
        "fixture files discovered"
    );
    Ok(files)
}

/// Parse every file, dropping the ones that are not valid fixtures.
#[must_use]
pub fn load_corpus(paths: &[PathBuf]) -> Vec<Fixture> {
    let fixtures: Vec<Fixture> = paths.iter().filter_map(|path| load_fixture(path)).collect();
    let rejected = paths.len().saturating_sub(fixtures.len());
    info!(
        target: "citecompat",
        files = paths.len(),
        fixtures = fixtures.len(),
        rejected,
        "corpus loaded"
    );
    fixtures
}

fn has_fixture_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(FIXTURE_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "\
>>===== MODE =====>>
bibliography
<<===== MODE =====<<
>>===== RESULT =====>>
ok
<<===== RESULT =====<<
>>===== CSL =====>>
<style><bibliography/></style>
<<===== CSL =====<<
>>===== INPUT =====>>
[{\"id\": \"A\"}]
<<===== INPUT =====<<
";

    fn corpus(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(name), VALID).unwrap();
        }
        dir
    }

    fn stems(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_stem().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_fixture_files(&dir.path().join("absent"), &CorpusFilter::default())
            .unwrap_err();
        assert!(matches!(err, CompatError::CorpusNotFound { .. }));
        assert!(!err.is_fixture_local());
    }

    #[test]
    fn test_sorted_txt_files_only() {
        let dir = corpus(&["name_b.txt", "date_a.txt", "name_a.txt", "README.md"]);
        fs::create_dir(dir.path().join("nested.txt")).unwrap();
        let files = discover_fixture_files(dir.path(), &CorpusFilter::default()).unwrap();
        assert_eq!(stems(&files), ["date_a", "name_a", "name_b"]);
    }

    #[test]
    fn test_category_then_limit() {
        let dir = corpus(&["name_c.txt", "name_a.txt", "date_a.txt", "name_b.txt"]);
        let filter = CorpusFilter {
            category: Some("name".to_owned()),
            limit: 2,
        };
        let files = discover_fixture_files(dir.path(), &filter).unwrap();
        assert_eq!(stems(&files), ["name_a", "name_b"]);
    }

    #[test]
    fn test_limit_zero_is_unlimited() {
        let dir = corpus(&["a_1.txt", "a_2.txt", "a_3.txt"]);
        let filter = CorpusFilter {
            category: None,
            limit: 0,
        };
        assert_eq!(discover_fixture_files(dir.path(), &filter).unwrap().len(), 3);
    }

    #[test]
    fn test_load_corpus_drops_invalid_files() {
        let dir = corpus(&["ok_one.txt"]);
        fs::write(dir.path().join("bad_one.txt"), "no sections here").unwrap();
        let files = discover_fixture_files(dir.path(), &CorpusFilter::default()).unwrap();
        assert_eq!(files.len(), 2);
        let fixtures = load_corpus(&files);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].name, "ok_one");
    }
}
