//! Execution runner: one fixture in, one verdict out.
//!
//! [`HarnessRunner::run_fixture`] drives the per-fixture pipeline (skip
//! policy, style preparation, record adaptation, test-case generation,
//! bounded engine run, classification). Every failure inside that pipeline
//! becomes an `error` verdict; nothing a single fixture does aborts the batch.
//! [`run_pipeline`] wraps the whole corpus run, from discovery through the
//! written report.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use chrono::Utc;
use citecompat_error::Result;
use tracing::{error, info, warn};

use crate::config::HarnessConfig;
use crate::fixture::Fixture;
use crate::fixture_discovery::{CorpusFilter, discover_fixture_files, load_corpus};
use crate::process::{ProcessExecutor, ProcessRequest};
use crate::report::{CompatibilityReport, build_report, write_report};
use crate::skip_policy::{SkipReason, evaluate_skip_policy};
use crate::style::prepare_style;
use crate::summary::{RunSummary, resolve_commit};
use crate::testcase::{TestCaseArtifacts, write_test_case};
use crate::verdict::{Resolution, RunLedger, Verdict, classify_outcome};

/// Runs fixtures against the configured engine.
#[derive(Debug)]
pub struct HarnessRunner<E> {
    config: HarnessConfig,
    executor: E,
    cancel: Option<Arc<AtomicBool>>,
}

impl<E: ProcessExecutor> HarnessRunner<E> {
    #[must_use]
    pub fn new(config: HarnessConfig, executor: E) -> Self {
        Self {
            config,
            executor,
            cancel: None,
        }
    }

    /// Share a cancellation flag with every engine invocation.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    #[must_use]
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Run one fixture to a resolved verdict.
    #[must_use]
    pub fn run_fixture(&self, fixture: &Fixture) -> Verdict {
        let started_at = Instant::now();
        let mut verdict = Verdict::new(fixture);

        let resolution = self.execute(fixture).unwrap_or_else(|error| {
            warn!(target: "citecompat", fixture = %fixture.name, %error, "fixture failed before classification");
            Resolution::Failed(error.to_string())
        });
        verdict.elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Err(error) = verdict.resolve(resolution) {
            error!(target: "citecompat", fixture = %fixture.name, %error, "verdict resolution rejected");
        }

        info!(
            target: "citecompat",
            fixture = %verdict.fixture_name,
            status = %verdict.status,
            reason = verdict.skip_reason.map(SkipReason::message),
            elapsed_ms = verdict.elapsed_ms,
            "fixture finished"
        );
        verdict
    }

    /// Run `fixtures` sequentially, in order.
    ///
    /// `observer` sees each verdict as `(index, total, verdict)` with a
    /// 1-based index.
    pub fn run_batch<F>(&self, fixtures: &[Fixture], mut observer: F) -> RunLedger
    where
        F: FnMut(usize, usize, &Verdict),
    {
        let total = fixtures.len();
        let mut ledger = RunLedger::new();
        for (idx, fixture) in fixtures.iter().enumerate() {
            let verdict = self.run_fixture(fixture);
            observer(idx + 1, total, &verdict);
            ledger.record(verdict);
        }
        ledger
    }

    fn execute(&self, fixture: &Fixture) -> Result<Resolution> {
        if let Some(reason) = evaluate_skip_policy(fixture, self.config.policy) {
            return Ok(Resolution::Skipped(reason));
        }

        let style = prepare_style(fixture, self.config.policy);
        let adapter = self.config.adapter.adapter();
        let adapted = adapter.adapt(&fixture.input)?;
        let artifacts = write_test_case(
            fixture,
            adapter,
            &adapted,
            &style,
            &self.config.project_root,
            &self.config.scratch_dir,
            &self.config.engine.library_import,
        )?;

        let outcome = self.executor.run(&self.compile_request(&artifacts))?;
        Ok(classify_outcome(&outcome))
    }

    /// `<engine> compile <program> <output> --root <project-root>`.
    #[must_use]
    pub fn compile_request(&self, artifacts: &TestCaseArtifacts) -> ProcessRequest {
        let mut request = ProcessRequest::new(&self.config.engine.program, self.config.engine.timeout)
            .arg("compile")
            .arg(&artifacts.program_path)
            .arg(&artifacts.output_path)
            .arg("--root")
            .arg(&self.config.project_root)
            .current_dir(&self.config.project_root);
        if let Some(flag) = &self.cancel {
            request = request.cancel_flag(Arc::clone(flag));
        }
        request
    }
}

// ── Corpus pipeline ────────────────────────────────────────────────────

/// Progress of a corpus run.
#[derive(Debug, Clone, Copy)]
pub enum PipelineEvent<'a> {
    FilesFound(usize),
    FixturesParsed(usize),
    FixtureFinished {
        index: usize,
        total: usize,
        verdict: &'a Verdict,
    },
    ReportWritten(&'a std::path::Path),
    SummaryWritten(&'a std::path::Path),
}

/// Per-run options that do not belong in [`HarnessConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub filter: CorpusFilter,
    /// Where to write the JSON run summary, if anywhere.
    pub summary_path: Option<PathBuf>,
    /// Commit recorded in the summary instead of asking git.
    pub commit: Option<String>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub files_found: usize,
    pub ledger: RunLedger,
    pub report: CompatibilityReport,
    pub summary: Option<RunSummary>,
}

/// Discover, parse, run, and report on the corpus.
///
/// # Errors
///
/// Returns [`citecompat_error::CompatError::CorpusNotFound`] when the
/// fixtures directory is missing and an I/O error when the report or
/// summary cannot be written. Fixture failures never surface here.
pub fn run_pipeline<E, F>(
    runner: &HarnessRunner<E>,
    options: &PipelineOptions,
    mut observer: F,
) -> Result<PipelineResult>
where
    E: ProcessExecutor,
    F: FnMut(PipelineEvent<'_>),
{
    let config = runner.config();
    let files = discover_fixture_files(&config.fixtures_dir, &options.filter)?;
    observer(PipelineEvent::FilesFound(files.len()));

    let fixtures = load_corpus(&files);
    observer(PipelineEvent::FixturesParsed(fixtures.len()));

    let ledger = runner.run_batch(&fixtures, |index, total, verdict| {
        observer(PipelineEvent::FixtureFinished {
            index,
            total,
            verdict,
        });
    });

    let report = build_report(ledger.verdicts());
    write_report(&report, &config.report_path)?;
    observer(PipelineEvent::ReportWritten(&config.report_path));

    let summary = match &options.summary_path {
        Some(path) => {
            let commit = resolve_commit(
                options.commit.as_deref(),
                runner.executor(),
                &config.project_root,
            );
            let summary = RunSummary::from_report(&report, &commit, Utc::now());
            summary.write_json(path)?;
            observer(PipelineEvent::SummaryWritten(path));
            Some(summary)
        }
        None => None,
    };

    Ok(PipelineResult {
        files_found: files.len(),
        ledger,
        report,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureMode;
    use crate::process::ProcessOutcome;
    use crate::skip_policy::CompatPolicy;
    use crate::verdict::Status;
    use citecompat_error::CompatError;
    use serde_json::json;
    use std::cell::RefCell;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingExecutor {
        outcome: ProcessOutcome,
        requests: RefCell<Vec<ProcessRequest>>,
    }

    impl ProcessExecutor for RecordingExecutor {
        fn run(&self, request: &ProcessRequest) -> Result<ProcessOutcome> {
            self.requests.borrow_mut().push(request.clone());
            Ok(self.outcome.clone())
        }
    }

    struct FailingExecutor;

    impl ProcessExecutor for FailingExecutor {
        fn run(&self, request: &ProcessRequest) -> Result<ProcessOutcome> {
            Err(CompatError::spawn(&request.program, "No such file or directory"))
        }
    }

    fn fixture(name: &str, mode: FixtureMode, style: &str) -> Fixture {
        Fixture {
            name: name.to_owned(),
            mode,
            expected_result: "Expected".to_owned(),
            style: style.to_owned(),
            input: serde_json::from_value(json!([{"id": "ITEM-1", "title": "T"}])).unwrap(),
            citation_items: None,
            citations: None,
            abbreviations: None,
        }
    }

    fn runner<E: ProcessExecutor>(root: &Path, executor: E) -> HarnessRunner<E> {
        HarnessRunner::new(HarnessConfig::with_project_root(root), executor)
    }

    #[test]
    fn test_compiled_fixture_invokes_engine() {
        let root = tempfile::tempdir().unwrap();
        let executor = RecordingExecutor {
            outcome: ProcessOutcome {
                exit_code: Some(0),
                ..ProcessOutcome::default()
            },
            ..RecordingExecutor::default()
        };
        let runner = runner(root.path(), executor);
        let verdict = runner.run_fixture(&fixture(
            "name_Ok",
            FixtureMode::Bibliography,
            "<style><bibliography/></style>",
        ));
        assert_eq!(verdict.status, Status::Compiled);

        let requests = runner.executor().requests.borrow();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.program, "typst");
        assert_eq!(request.args[0], "compile");
        assert!(request.args[1].to_string_lossy().ends_with("name_Ok.typ"));
        assert!(request.args[2].to_string_lossy().ends_with("name_Ok.pdf"));
        assert_eq!(request.args[3], "--root");
        assert_eq!(request.current_dir.as_deref(), Some(root.path()));
        assert_eq!(request.timeout, std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_skipped_fixture_never_invokes_engine() {
        let root = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::with_project_root(root.path());
        config.policy = CompatPolicy::Strict;
        let runner = HarnessRunner::new(config, RecordingExecutor::default());
        let verdict = runner.run_fixture(&fixture(
            "sort_Nosort",
            FixtureMode::BibliographyNosort,
            "<style><bibliography/></style>",
        ));
        assert_eq!(verdict.status, Status::Skipped);
        assert_eq!(verdict.skip_reason, Some(SkipReason::NosortMode));
        assert!(runner.executor().requests.borrow().is_empty());
        assert!(!root.path().join("build").exists());
    }

    #[test]
    fn test_spawn_failure_becomes_error_verdict() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(root.path(), FailingExecutor);
        let fixtures = vec![
            fixture("a_1", FixtureMode::Bibliography, "<style><bibliography/></style>"),
            fixture("a_2", FixtureMode::Bibliography, "<style><bibliography/></style>"),
        ];
        let ledger = runner.run_batch(&fixtures, |_, _, _| {});
        assert_eq!(ledger.count(Status::Error), 2);
        let message = ledger.verdicts()[0].error_message.as_deref().unwrap();
        assert!(message.contains("failed to spawn 'typst'"));
    }

    #[test]
    fn test_batch_observer_sees_progress_in_order() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(root.path(), RecordingExecutor::default());
        let fixtures = vec![
            fixture("b_1", FixtureMode::Bibliography, "<style><bibliography/></style>"),
            fixture("b_2", FixtureMode::Bibliography, "<style><bibliography/></style>"),
        ];
        let mut seen = Vec::new();
        let ledger = runner.run_batch(&fixtures, |index, total, verdict| {
            seen.push((index, total, verdict.fixture_name.clone()));
        });
        assert_eq!(
            seen,
            [(1, 2, "b_1".to_owned()), (2, 2, "b_2".to_owned())]
        );
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_cancel_flag_is_forwarded() {
        let root = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let runner = runner(root.path(), RecordingExecutor::default())
            .with_cancel_flag(Arc::clone(&flag));
        let _ = runner.run_fixture(&fixture(
            "c_1",
            FixtureMode::Bibliography,
            "<style><bibliography/></style>",
        ));
        let requests = runner.executor().requests.borrow();
        assert!(requests[0].cancel.as_ref().is_some_and(|f| Arc::ptr_eq(f, &flag)));
    }
}
