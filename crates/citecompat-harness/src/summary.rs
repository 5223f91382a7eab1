//! Machine-readable run summary consumed by the docs-site aggregator.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use citecompat_error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::process::{ProcessExecutor, ProcessRequest};
use crate::report::CompatibilityReport;
use crate::verdict::Status;

/// Commit recorded when none can be determined.
pub const UNKNOWN_COMMIT: &str = "unknown";
const SHORT_COMMIT_LEN: usize = 7;
const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-category row of the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub name: String,
    pub total: usize,
    pub compiled: usize,
    pub skipped: usize,
    pub error: usize,
}

/// Totals for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// RFC 3339 UTC timestamp.
    pub date: String,
    pub commit: String,
    pub total: usize,
    pub compiled: usize,
    pub skipped: usize,
    pub errors: usize,
    pub timeouts: usize,
    pub categories: Vec<CategoryMetrics>,
}

impl RunSummary {
    #[must_use]
    pub fn from_report(report: &CompatibilityReport, commit: &str, at: DateTime<Utc>) -> Self {
        Self {
            date: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            commit: short_commit(commit),
            total: report.total,
            compiled: report.count(Status::Compiled),
            skipped: report.count(Status::Skipped),
            errors: report.count(Status::Error),
            timeouts: report.count(Status::Timeout),
            categories: report
                .categories
                .iter()
                .map(|stats| CategoryMetrics {
                    name: stats.name.clone(),
                    total: stats.total,
                    compiled: stats.compiled,
                    skipped: stats.skipped,
                    error: stats.error,
                })
                .collect(),
        }
    }

    /// Write the summary as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the write fails.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        fs::write(path, json)?;
        info!(target: "citecompat", path = %path.display(), "run summary written");
        Ok(())
    }
}

/// Trimmed, at most seven characters; blank input becomes [`UNKNOWN_COMMIT`].
#[must_use]
pub fn short_commit(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNKNOWN_COMMIT.to_owned();
    }
    trimmed.chars().take(SHORT_COMMIT_LEN).collect()
}

/// Commit of the checkout at `project_root`.
///
/// An explicit commit wins; otherwise `git rev-parse --short HEAD` is run
/// through `executor`. Any failure yields [`UNKNOWN_COMMIT`].
#[must_use]
pub fn resolve_commit<E: ProcessExecutor + ?Sized>(
    explicit: Option<&str>,
    executor: &E,
    project_root: &Path,
) -> String {
    if let Some(commit) = explicit {
        return short_commit(commit);
    }

    let request = ProcessRequest::new("git", GIT_TIMEOUT)
        .arg("rev-parse")
        .arg("--short")
        .arg("HEAD")
        .current_dir(project_root);
    match executor.run(&request) {
        Ok(outcome) if outcome.success() => short_commit(&outcome.stdout),
        Ok(outcome) => {
            debug!(target: "citecompat", exit_code = ?outcome.exit_code, "git rev-parse failed");
            UNKNOWN_COMMIT.to_owned()
        }
        Err(error) => {
            debug!(target: "citecompat", %error, "git unavailable");
            UNKNOWN_COMMIT.to_owned()
        }
    }
}
