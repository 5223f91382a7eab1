//! Harness configuration.
//!
//! Defaults describe the standard project layout. An optional
//! `citecompat.toml` at the project root overrides them:
//!
//! ```toml
//! [paths]
//! fixtures_dir = "references/citeproc-js/fixtures/local"
//! scratch_dir = "build/citeproc-tests"
//! report = "build/citeproc-compatibility-report.md"
//!
//! [engine]
//! program = "typst"
//! library_import = "/lib.typ"
//! timeout_secs = 30
//!
//! [policy]
//! compat = "shim"
//! adapter = "csl-json"
//! ```
//!
//! Relative paths are resolved against the project root.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use citecompat_error::{CompatError, Result};
use serde::Deserialize;
use tracing::debug;

use crate::adapter::AdapterKind;
use crate::skip_policy::CompatPolicy;
use crate::testcase::DEFAULT_LIBRARY_IMPORT;

/// Configuration file looked up at the project root.
pub const DEFAULT_CONFIG_FILE: &str = "citecompat.toml";
pub const DEFAULT_FIXTURES_DIR: &str = "references/citeproc-js/fixtures/local";
pub const DEFAULT_SCRATCH_DIR: &str = "build/citeproc-tests";
pub const DEFAULT_REPORT_PATH: &str = "build/citeproc-compatibility-report.md";
pub const DEFAULT_ENGINE: &str = "typst";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// External engine invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Program name or path of the engine CLI.
    pub program: String,
    /// Import path of the engine library inside generated programs.
    pub library_import: String,
    /// Wall-clock bound per fixture.
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_ENGINE.to_owned(),
            library_import: DEFAULT_LIBRARY_IMPORT.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Fully resolved harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub project_root: PathBuf,
    pub fixtures_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub report_path: PathBuf,
    pub engine: EngineConfig,
    pub policy: CompatPolicy,
    pub adapter: AdapterKind,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    #[serde(default)]
    paths: PathsSection,
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    policy: PolicySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsSection {
    fixtures_dir: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    report: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineSection {
    program: Option<String>,
    library_import: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicySection {
    compat: Option<CompatPolicy>,
    adapter: Option<AdapterKind>,
}

impl HarnessConfig {
    /// Default configuration rooted at `project_root`.
    #[must_use]
    pub fn with_project_root(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            fixtures_dir: project_root.join(DEFAULT_FIXTURES_DIR),
            scratch_dir: project_root.join(DEFAULT_SCRATCH_DIR),
            report_path: project_root.join(DEFAULT_REPORT_PATH),
            engine: EngineConfig::default(),
            policy: CompatPolicy::default(),
            adapter: AdapterKind::default(),
            project_root,
        }
    }

    /// Load configuration for `project_root`.
    ///
    /// A relative `project_root` is made absolute against the current
    /// directory first, since the engine runs with the root as its working
    /// directory. With `config_path`, that file must exist. Without it,
    /// [`DEFAULT_CONFIG_FILE`] is read when present and defaults apply
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CompatError::Config`] when the root cannot be made
    /// absolute, or when the file is missing (explicit path only),
    /// unreadable, malformed, or holds invalid values.
    pub fn load(project_root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let project_root = std::path::absolute(project_root).map_err(|error| {
            CompatError::config(project_root, format!("cannot resolve project root: {error}"))
        })?;
        let mut config = Self::with_project_root(project_root.clone());
        let path = match config_path {
            Some(explicit) => {
                let path = resolve_project_path(&project_root, explicit);
                if !path.is_file() {
                    return Err(CompatError::config(path, "file not found"));
                }
                path
            }
            None => {
                let path = project_root.join(DEFAULT_CONFIG_FILE);
                if !path.is_file() {
                    return Ok(config);
                }
                path
            }
        };

        let raw = fs::read_to_string(&path)
            .map_err(|error| CompatError::config(&path, format!("read failed: {error}")))?;
        config.apply_toml(&path, &raw)?;
        debug!(target: "citecompat", path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply a TOML document on top of the current values.
    ///
    /// The whole document is validated before anything is assigned, so a
    /// rejected document leaves `self` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CompatError::Config`] naming `path` when the document does
    /// not parse, holds invalid values, or places the scratch directory
    /// outside the project root.
    pub fn apply_toml(&mut self, path: &Path, raw: &str) -> Result<()> {
        let doc = toml::from_str::<ConfigDocument>(raw)
            .map_err(|error| CompatError::config(path, error.to_string()))?;

        let root = &self.project_root;
        let fixtures_dir = doc.paths.fixtures_dir.map(|dir| resolve_project_path(root, &dir));
        let report_path = doc.paths.report.map(|report| resolve_project_path(root, &report));
        let scratch_dir = doc
            .paths
            .scratch_dir
            .map(|dir| resolve_project_path(root, &dir));
        if let Some(dir) = &scratch_dir {
            if !is_inside(root, dir) {
                return Err(CompatError::config(
                    path,
                    format!(
                        "paths.scratch_dir {} must be inside the project root {}",
                        dir.display(),
                        root.display()
                    ),
                ));
            }
        }

        let program = doc
            .engine
            .program
            .map(|program| non_empty(path, "engine.program", program))
            .transpose()?;
        let library_import = doc
            .engine
            .library_import
            .map(|import| non_empty(path, "engine.library_import", import))
            .transpose()?;
        let timeout = doc
            .engine
            .timeout_secs
            .map(|secs| {
                timeout_from_secs(secs).ok_or_else(|| {
                    CompatError::config(path, "engine.timeout_secs must be positive")
                })
            })
            .transpose()?;

        // Validated; assign.
        if let Some(dir) = fixtures_dir {
            self.fixtures_dir = dir;
        }
        if let Some(dir) = scratch_dir {
            self.scratch_dir = dir;
        }
        if let Some(report) = report_path {
            self.report_path = report;
        }
        if let Some(program) = program {
            self.engine.program = program;
        }
        if let Some(import) = library_import {
            self.engine.library_import = import;
        }
        if let Some(timeout) = timeout {
            self.engine.timeout = timeout;
        }
        if let Some(policy) = doc.policy.compat {
            self.policy = policy;
        }
        if let Some(adapter) = doc.policy.adapter {
            self.adapter = adapter;
        }
        Ok(())
    }
}

/// Positive timeout in whole seconds.
#[must_use]
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Resolve `path` against `project_root` unless it is already absolute.
#[must_use]
pub fn resolve_project_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

/// Whether `path` lies at or below `root` without climbing out through `..`.
fn is_inside(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root).is_ok_and(|rest| {
        rest.components()
            .all(|part| matches!(part, Component::Normal(_) | Component::CurDir))
    })
}

fn non_empty(path: &Path, field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(CompatError::config(path, format!("{field} must not be empty")));
    }
    Ok(value)
}
