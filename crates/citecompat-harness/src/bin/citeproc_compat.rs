//! Run the citeproc-js fixture corpus against the CSL engine and write the
//! compatibility report.
//!
//! Exit codes: 0 when the run completes (whatever the fixture outcomes),
//! 1 when the corpus is missing or the report cannot be written, 2 for
//! configuration errors.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use citecompat_error::CompatError;
use citecompat_harness::adapter::AdapterKind;
use citecompat_harness::config::timeout_from_secs;
use citecompat_harness::fixture_discovery::CorpusFilter;
use citecompat_harness::skip_policy::CompatPolicy;
use citecompat_harness::{
    HarnessConfig, HarnessRunner, PipelineEvent, PipelineOptions, SystemProcessExecutor,
    run_pipeline,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

// ── CLI ──────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "citeproc-compat",
    version,
    about = "Run citeproc-js fixtures against a CSL rendering engine"
)]
struct Cli {
    /// Run at most N fixture files (0 = all).
    #[arg(long, default_value_t = 0, value_name = "N")]
    limit: usize,

    /// Only run fixtures whose name starts with this prefix.
    #[arg(long, value_name = "NAME")]
    category: Option<String>,

    /// Print per-fixture progress and enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Project root (defaults to the current directory).
    #[arg(long, value_name = "DIR")]
    project_root: Option<PathBuf>,

    /// Configuration file (defaults to citecompat.toml in the project root).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compatibility policy.
    #[arg(long, value_name = "shim|strict")]
    policy: Option<CompatPolicy>,

    /// Data format handed to the engine.
    #[arg(long, value_name = "csl-json|bibtex")]
    adapter: Option<AdapterKind>,

    /// Engine program.
    #[arg(long, value_name = "PROGRAM")]
    engine: Option<String>,

    /// Per-fixture wall-clock bound in seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Also write a JSON run summary here.
    #[arg(long, value_name = "FILE")]
    summary_json: Option<PathBuf>,

    /// Commit recorded in the run summary (defaults to git HEAD).
    #[arg(long, value_name = "SHA")]
    commit: Option<String>,
}

fn main() {
    std::process::exit(run_cli(std::env::args_os()));
}

fn run_cli<I>(os_args: I) -> i32
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(os_args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return if error.use_stderr() { 2 } else { 0 };
        }
    };
    init_tracing(cli.verbose);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Error: {error}");
            return error.exit_code();
        }
    };

    let options = PipelineOptions {
        filter: CorpusFilter {
            category: cli.category.clone(),
            limit: cli.limit,
        },
        summary_path: cli.summary_json.clone(),
        commit: cli.commit.clone(),
    };
    let runner = HarnessRunner::new(config, SystemProcessExecutor::default());
    let verbose = cli.verbose;

    let result = run_pipeline(&runner, &options, |event| match event {
        PipelineEvent::FilesFound(count) => println!("Found {count} fixture files"),
        PipelineEvent::FixturesParsed(count) => println!("Parsed {count} valid fixtures"),
        PipelineEvent::FixtureFinished {
            index,
            total,
            verdict,
        } => {
            if verbose {
                println!(
                    "[{index}/{total}] Testing {}... {}",
                    verdict.fixture_name, verdict.status
                );
            }
        }
        PipelineEvent::ReportWritten(path) => println!("Report written to {}", path.display()),
        PipelineEvent::SummaryWritten(path) => {
            println!("Summary written to {}", path.display());
        }
    });

    match result {
        Ok(result) => {
            println!();
            println!("{}", "=".repeat(60));
            println!("Summary");
            println!("{}", "=".repeat(60));
            for (status, count) in &result.report.status_counts {
                println!("  {status}: {count}");
            }
            0
        }
        Err(error) => {
            eprintln!("Error: {error}");
            error.exit_code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Defaults, then the config file, then flags.
fn build_config(cli: &Cli) -> Result<HarnessConfig, CompatError> {
    let project_root = match &cli.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let mut config = HarnessConfig::load(&project_root, cli.config.as_deref())?;

    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    if let Some(adapter) = cli.adapter {
        config.adapter = adapter;
    }
    if let Some(engine) = &cli.engine {
        config.engine.program.clone_from(engine);
    }
    if let Some(secs) = cli.timeout_secs {
        config.engine.timeout = timeout_from_secs(secs)
            .ok_or_else(|| CompatError::config("--timeout-secs", "must be positive"))?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn args(raw: &[&str]) -> Vec<OsString> {
        std::iter::once("citeproc-compat")
            .chain(raw.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("citecompat.toml"),
            "[engine]\nprogram = \"from-file\"\ntimeout_secs = 9\n",
        )
        .unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(args(&[
            "--project-root",
            &root,
            "--engine",
            "from-flag",
            "--policy",
            "strict",
        ]))
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.engine.program, "from-flag");
        assert_eq!(config.engine.timeout, Duration::from_secs(9));
        assert_eq!(config.policy, CompatPolicy::Strict);
        assert_eq!(config.adapter, AdapterKind::CslJson);
    }

    #[test]
    fn test_zero_timeout_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let code = run_cli(args(&["--project-root", &root, "--timeout-secs", "0"]));
        assert_eq!(code, 2);
    }

    #[test]
    fn test_missing_corpus_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        assert_eq!(run_cli(args(&["--project-root", &root])), 1);
        assert!(!dir.path().join("build").exists());
    }

    #[test]
    fn test_bad_policy_rejected_by_parser() {
        assert!(Cli::try_parse_from(args(&["--policy", "lenient"])).is_err());
        let cli = Cli::try_parse_from(args(&["-v", "--limit", "3", "--adapter", "bibtex"])).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.limit, 3);
        assert_eq!(cli.adapter, Some(AdapterKind::Bibtex));
    }
}
