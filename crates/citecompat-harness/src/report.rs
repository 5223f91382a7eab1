//! Compatibility report: verdicts -> aggregate Markdown document.
//!
//! [`build_report`] aggregates a run into a [`CompatibilityReport`];
//! [`render_markdown`] turns that into the document written next to the
//! scratch directory. Aggregation and rendering are separate so the run
//! summary can reuse the category table.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

use citecompat_error::Result;
use serde::Serialize;
use tracing::{error, info};

use crate::verdict::{Status, Verdict, status_counts, truncate_chars};

/// Document title.
pub const REPORT_TITLE: &str = "citeproc-typst Compatibility Report";
/// Example fixture names listed per skip reason.
pub const MAX_SKIP_EXAMPLES: usize = 5;
/// Failed fixtures listed in the errors section.
pub const MAX_LISTED_ERRORS: usize = 20;
/// Characters of each listed error message.
pub const MAX_ERROR_EXCERPT_CHARS: usize = 300;

/// Category of a fixture: its name up to the first `_`.
#[must_use]
pub fn category_of(name: &str) -> &str {
    name.split_once('_').map_or(name, |(category, _)| category)
}

/// Per-category counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub name: String,
    pub total: usize,
    pub compiled: usize,
    pub skipped: usize,
    pub error: usize,
}

/// Fixtures skipped for one reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipGroup {
    pub reason: String,
    pub fixtures: Vec<String>,
}

/// One failed fixture listed in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub fixture: String,
    pub excerpt: String,
}

/// Aggregated view of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityReport {
    pub total: usize,
    /// Status histogram in status order.
    pub status_counts: BTreeMap<Status, usize>,
    /// Sorted by category name.
    pub categories: Vec<CategoryStats>,
    /// Sorted by reason text.
    pub skip_groups: Vec<SkipGroup>,
    /// Every `error` verdict, in run order.
    pub errors: Vec<ErrorEntry>,
}

impl CompatibilityReport {
    #[must_use]
    pub fn count(&self, status: Status) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }
}

/// Aggregate `verdicts`.
#[must_use]
pub fn build_report(verdicts: &[Verdict]) -> CompatibilityReport {
    let mut categories: BTreeMap<&str, CategoryStats> = BTreeMap::new();
    let mut skip_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut errors = Vec::new();

    for verdict in verdicts {
        if verdict.status == Status::Unknown {
            error!(
                target: "citecompat",
                fixture = %verdict.fixture_name,
                "unresolved verdict reached the report"
            );
        }

        let category = category_of(&verdict.fixture_name);
        let stats = categories
            .entry(category)
            .or_insert_with(|| CategoryStats {
                name: category.to_owned(),
                ..CategoryStats::default()
            });
        stats.total = stats.total.saturating_add(1);
        match verdict.status {
            Status::Compiled => stats.compiled = stats.compiled.saturating_add(1),
            Status::Skipped => stats.skipped = stats.skipped.saturating_add(1),
            Status::Error => stats.error = stats.error.saturating_add(1),
            Status::Timeout | Status::Unknown => {}
        }

        match verdict.status {
            Status::Skipped => {
                let reason = verdict
                    .skip_reason
                    .map_or_else(|| "Unspecified".to_owned(), |r| r.message().to_owned());
                skip_groups
                    .entry(reason)
                    .or_default()
                    .push(verdict.fixture_name.clone());
            }
            Status::Error => errors.push(ErrorEntry {
                fixture: verdict.fixture_name.clone(),
                excerpt: error_excerpt(verdict.error_message.as_deref()),
            }),
            _ => {}
        }
    }

    CompatibilityReport {
        total: verdicts.len(),
        status_counts: status_counts(verdicts),
        categories: categories.into_values().collect(),
        skip_groups: skip_groups
            .into_iter()
            .map(|(reason, fixtures)| SkipGroup { reason, fixtures })
            .collect(),
        errors,
    }
}

fn error_excerpt(message: Option<&str>) -> String {
    match message {
        Some(message) if !message.is_empty() => truncate_chars(message, MAX_ERROR_EXCERPT_CHARS),
        _ => "Unknown error".to_owned(),
    }
}

/// Render the Markdown document.
#[must_use]
pub fn render_markdown(report: &CompatibilityReport) -> String {
    let mut out = String::with_capacity(4096);

    let _ = writeln!(out, "# {REPORT_TITLE}");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Total Tests:** {}", report.total);
    let _ = writeln!(out);

    // ── Status histogram ──
    let _ = writeln!(out, "## Summary by Status");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Status | Count | Percentage |");
    let _ = writeln!(out, "|--------|-------|------------|");
    for (status, count) in &report.status_counts {
        let _ = writeln!(
            out,
            "| {status} | {count} | {:.1}% |",
            percentage(*count, report.total)
        );
    }
    let _ = writeln!(out);

    // ── Categories ──
    let _ = writeln!(out, "## Summary by Category");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Category | Total | Compiled | Skipped | Error |");
    let _ = writeln!(out, "|----------|-------|----------|---------|-------|");
    for stats in &report.categories {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            stats.name, stats.total, stats.compiled, stats.skipped, stats.error
        );
    }
    let _ = writeln!(out);

    // ── Skips ──
    let _ = writeln!(out, "## Skipped Tests (Feature Gaps)");
    let _ = writeln!(out);
    for group in &report.skip_groups {
        let _ = writeln!(out, "### {} ({} tests)", group.reason, group.fixtures.len());
        let _ = writeln!(out);
        for name in group.fixtures.iter().take(MAX_SKIP_EXAMPLES) {
            let _ = writeln!(out, "- `{name}`");
        }
        if group.fixtures.len() > MAX_SKIP_EXAMPLES {
            let _ = writeln!(
                out,
                "- ... and {} more",
                group.fixtures.len() - MAX_SKIP_EXAMPLES
            );
        }
        let _ = writeln!(out);
    }

    // ── Errors ──
    let _ = writeln!(out, "## Failed Tests (Errors)");
    let _ = writeln!(out);
    if report.errors.is_empty() {
        let _ = writeln!(out, "No errors!");
    } else {
        for entry in report.errors.iter().take(MAX_LISTED_ERRORS) {
            let _ = writeln!(out, "### `{}`", entry.fixture);
            let _ = writeln!(out);
            let _ = writeln!(out, "```");
            let _ = writeln!(out, "{}", entry.excerpt);
            let _ = writeln!(out, "```");
            let _ = writeln!(out);
        }
    }

    out
}

#[allow(clippy::cast_precision_loss)]
fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

/// Render `report` and write it to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an I/O error when the directory or file cannot be written.
pub fn write_report(report: &CompatibilityReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_markdown(report))?;
    info!(target: "citecompat", path = %path.display(), total = report.total, "report written");
    Ok(())
}
