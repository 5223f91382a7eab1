//! citeproc-js fixture compatibility harness.
//!
//! Parses the citeproc-js fixture corpus, turns each fixture into a minimal
//! program for an external CSL rendering engine, runs the engine under a
//! wall-clock bound, and aggregates the outcomes into a Markdown
//! compatibility report (plus an optional JSON run summary).

pub mod adapter;
pub mod config;
pub mod fixture;
pub mod fixture_discovery;
pub mod process;
pub mod record;
pub mod report;
pub mod runner;
pub mod skip_policy;
pub mod style;
pub mod summary;
pub mod testcase;
pub mod verdict;

pub use config::HarnessConfig;
pub use fixture::{Fixture, FixtureMode, parse_fixture};
pub use process::{ProcessExecutor, ProcessOutcome, ProcessRequest, SystemProcessExecutor};
pub use runner::{HarnessRunner, PipelineEvent, PipelineOptions, PipelineResult, run_pipeline};
pub use verdict::{RunLedger, Status, Verdict};
