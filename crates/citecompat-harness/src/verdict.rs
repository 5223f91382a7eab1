//! Per-fixture verdicts and their classification.

use std::collections::BTreeMap;
use std::fmt;

use citecompat_error::{CompatError, Result};
use serde::{Deserialize, Serialize};

use crate::fixture::{Fixture, FixtureMode};
use crate::process::ProcessOutcome;
use crate::skip_policy::SkipReason;

/// Maximum characters of engine diagnostics kept on a verdict.
pub const MAX_ERROR_CHARS: usize = 500;
/// Actual-output marker for a successful compilation.
pub const COMPILED_OUTPUT_MARKER: &str = "(output artifact generated; rendered text not compared)";
pub const TIMEOUT_MESSAGE: &str = "Compilation timed out";
pub const CANCELLED_MESSAGE: &str = "Execution cancelled";

/// Outcome status of one fixture.
///
/// Declaration order is alphabetical, so the derived ordering matches the
/// order statuses are listed in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Compiled,
    Error,
    Skipped,
    Timeout,
    Unknown,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compiled => "compiled",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a verdict is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Skipped(SkipReason),
    Compiled,
    Failed(String),
    TimedOut,
}

/// Result record for one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub fixture_name: String,
    pub mode: FixtureMode,
    pub status: Status,
    pub expected_result: String,
    pub actual_output: Option<String>,
    pub error_message: Option<String>,
    pub skip_reason: Option<SkipReason>,
    pub elapsed_ms: u64,
}

impl Verdict {
    /// A fresh, unresolved verdict for `fixture`.
    #[must_use]
    pub fn new(fixture: &Fixture) -> Self {
        Self {
            fixture_name: fixture.name.clone(),
            mode: fixture.mode,
            status: Status::Unknown,
            expected_result: fixture.expected_result.clone(),
            actual_output: None,
            error_message: None,
            skip_reason: None,
            elapsed_ms: 0,
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self.status, Status::Unknown)
    }

    /// Resolve the verdict. Resolution happens exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`CompatError::AlreadyResolved`] when the verdict already has a
    /// terminal status; the verdict is left unchanged.
    pub fn resolve(&mut self, resolution: Resolution) -> Result<()> {
        if self.is_resolved() {
            return Err(CompatError::AlreadyResolved {
                fixture: self.fixture_name.clone(),
            });
        }
        match resolution {
            Resolution::Skipped(reason) => {
                self.status = Status::Skipped;
                self.skip_reason = Some(reason);
            }
            Resolution::Compiled => {
                self.status = Status::Compiled;
                self.actual_output = Some(COMPILED_OUTPUT_MARKER.to_owned());
            }
            Resolution::Failed(message) => {
                self.status = Status::Error;
                self.error_message = Some(truncate_chars(&message, MAX_ERROR_CHARS));
            }
            Resolution::TimedOut => {
                self.status = Status::Timeout;
                self.error_message = Some(TIMEOUT_MESSAGE.to_owned());
            }
        }
        Ok(())
    }
}

/// Map a finished subprocess onto a verdict resolution.
#[must_use]
pub fn classify_outcome(outcome: &ProcessOutcome) -> Resolution {
    if outcome.timed_out {
        return Resolution::TimedOut;
    }
    if outcome.cancelled {
        return Resolution::Failed(CANCELLED_MESSAGE.to_owned());
    }
    if outcome.exit_code == Some(0) {
        return Resolution::Compiled;
    }
    let stderr = outcome.stderr.trim();
    if !stderr.is_empty() {
        return Resolution::Failed(truncate_chars(stderr, MAX_ERROR_CHARS));
    }
    match outcome.exit_code {
        Some(code) => Resolution::Failed(format!("engine exited with status {code}")),
        None => Resolution::Failed("engine terminated by signal".to_owned()),
    }
}

/// First `max` characters of `text`, never splitting a code point.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_owned(),
        None => text.to_owned(),
    }
}

/// Append-only accumulator of verdicts for one run.
#[derive(Debug, Clone, Default)]
pub struct RunLedger {
    verdicts: Vec<Verdict>,
}

impl RunLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, verdict: Verdict) {
        self.verdicts.push(verdict);
    }

    #[must_use]
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    #[must_use]
    pub fn into_verdicts(self) -> Vec<Verdict> {
        self.verdicts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    /// Verdict count per status, in status order.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<Status, usize> {
        status_counts(&self.verdicts)
    }

    #[must_use]
    pub fn count(&self, status: Status) -> usize {
        self.verdicts.iter().filter(|v| v.status == status).count()
    }
}

/// Histogram of `verdicts` by status.
#[must_use]
pub fn status_counts(verdicts: &[Verdict]) -> BTreeMap<Status, usize> {
    let mut counts = BTreeMap::new();
    for verdict in verdicts {
        let entry = counts.entry(verdict.status).or_insert(0_usize);
        *entry = entry.saturating_add(1);
    }
    counts
}
