//! Bounded subprocess execution.
//!
//! [`ProcessExecutor`] is the seam between the execution runner and the
//! operating system: timeout and cancellation are explicit request
//! parameters, so tests can script outcomes without spawning anything.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read as _, Seek as _, SeekFrom};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use citecompat_error::{CompatError, Result};
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 25;

/// One subprocess invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Duration,
    /// Setting the flag kills the child at the next poll.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ProcessRequest {
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout,
            cancel: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Shell-like rendering for logs.
    #[must_use]
    pub fn display_command(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// What happened to a subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutcome {
    /// `None` when the child was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl ProcessOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }
}

/// Runs subprocesses to completion or until their bound expires.
pub trait ProcessExecutor {
    /// # Errors
    ///
    /// Returns [`CompatError::Spawn`] when the program cannot be started and
    /// [`CompatError::Io`] when waiting on it fails.
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutcome>;
}

/// [`ProcessExecutor`] backed by `std::process`.
#[derive(Debug, Clone, Copy)]
pub struct SystemProcessExecutor {
    poll_interval: Duration,
}

impl Default for SystemProcessExecutor {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MILLIS),
        }
    }
}

impl SystemProcessExecutor {
    #[must_use]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }
}

impl ProcessExecutor for SystemProcessExecutor {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutcome> {
        // Unnamed files cannot fill up and stall the child the way a pipe
        // nobody drains would.
        let mut stdout_file = tempfile::tempfile()?;
        let mut stderr_file = tempfile::tempfile()?;
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone()?))
            .stderr(Stdio::from(stderr_file.try_clone()?));
        if let Some(dir) = &request.current_dir {
            command.current_dir(dir);
        }

        debug!(target: "citecompat", command = %request.display_command(), "spawning engine");
        let mut child = command
            .spawn()
            .map_err(|error| CompatError::spawn(&request.program, error.to_string()))?;

        let status = wait_for_child(&mut child, request, self.poll_interval)?;
        let stdout = read_captured(&mut stdout_file)?;
        let stderr = read_captured(&mut stderr_file)?;

        Ok(ProcessOutcome {
            exit_code: status.exit_code,
            stdout,
            stderr,
            timed_out: status.timed_out,
            cancelled: status.cancelled,
            elapsed_ms: status.elapsed_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChildStatus {
    exit_code: Option<i32>,
    timed_out: bool,
    cancelled: bool,
    elapsed_ms: u64,
}

fn wait_for_child(
    child: &mut Child,
    request: &ProcessRequest,
    poll_interval: Duration,
) -> Result<ChildStatus> {
    let started_at = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ChildStatus {
                exit_code: status.code(),
                timed_out: false,
                cancelled: false,
                elapsed_ms: elapsed_ms_u64(started_at.elapsed()),
            });
        }

        let timed_out = started_at.elapsed() >= request.timeout;
        let cancelled = request.is_cancelled();
        if timed_out || cancelled {
            if let Err(error) = child.kill() {
                warn!(target: "citecompat", program = %request.program, %error, "kill failed");
            }
            let status = child.wait()?;
            return Ok(ChildStatus {
                exit_code: status.code(),
                timed_out,
                cancelled: cancelled && !timed_out,
                elapsed_ms: elapsed_ms_u64(started_at.elapsed()),
            });
        }
        thread::sleep(poll_interval);
    }
}

fn read_captured(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn elapsed_ms_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
