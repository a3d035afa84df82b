//! Subprocess sandbox for generated scripts
//!
//! Each execution writes the script to a uniquely named temporary file, runs it
//! with the host interpreter in a fresh child process, and captures stdout and
//! stderr separately under a hard wall-clock timeout. Process isolation only:
//! there is no filesystem or network confinement.

mod tool;

pub use tool::{SandboxTool, TOOL_NAME};

use crate::ExecutorConfig;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Prefix of every failed execution transcript
pub const FAILURE_SENTINEL: &str = "Execution Error:";

/// Prefix of every successful execution transcript
pub const SUCCESS_SENTINEL: &str = "Execution successful. Output:\n";

/// Diagnostic reported when there is nothing to run
pub const EMPTY_CODE_MESSAGE: &str = "Execution Error: No valid Python code provided to execute.";

/// Errors from sandbox setup
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("No Python interpreter found on PATH (tried python3, python)")]
    InterpreterNotFound,

    #[error("Interpreter {0} is not runnable")]
    InterpreterNotRunnable(PathBuf),
}

/// Result of one sandbox execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The process ran to completion (any exit status)
    Completed {
        stdout: String,
        stderr: String,
        /// None when the process was killed by a signal
        exit_code: Option<i32>,
    },
    /// The process exceeded its time limit and was killed
    TimedOut { timeout_secs: u64 },
    /// Nothing was executed: empty input, or the file/process could not be set up
    SetupFailed { message: String },
}

impl ExecutionOutcome {
    /// Exit code, if the process ran to completion
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionOutcome::Completed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Whether the process ran and exited with status 0
    pub fn succeeded(&self) -> bool {
        self.exit_code() == Some(0)
    }

    /// Render as a transcript prefixed with the success or failure sentinel
    pub fn render(&self) -> String {
        match self {
            ExecutionOutcome::Completed {
                stdout,
                exit_code: Some(0),
                ..
            } => {
                let output = if stdout.is_empty() { "No output." } else { stdout };
                format!("{}{}", SUCCESS_SENTINEL, output)
            }
            ExecutionOutcome::Completed {
                stderr, exit_code, ..
            } => {
                let error_output = if stderr.is_empty() {
                    "No error message captured."
                } else {
                    stderr
                };
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                format!(
                    "{} Subprocess failed with return code {}. Error:\n{}",
                    FAILURE_SENTINEL, code, error_output
                )
            }
            ExecutionOutcome::TimedOut { timeout_secs } => format!(
                "{} Code execution timed out after {} seconds.",
                FAILURE_SENTINEL, timeout_secs
            ),
            ExecutionOutcome::SetupFailed { message } => message.clone(),
        }
    }
}

/// The output after the success sentinel, trimmed. Text without the sentinel is
/// returned unchanged.
pub fn success_payload(raw: &str) -> String {
    match raw.strip_prefix(SUCCESS_SENTINEL) {
        Some(payload) => payload.trim().to_string(),
        None => raw.to_string(),
    }
}

static FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+.-]*[ \t]*\r?$\n?").expect("valid fence regex")
});

static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)```[ \t]*\r?$").expect("valid fence regex"));

/// Strip markdown code fences (with optional language tags) and surrounding
/// whitespace from model output
pub fn clean_code(code: &str) -> String {
    let without_fences = FENCE_LINE.replace_all(code, "");
    TRAILING_FENCE
        .replace_all(&without_fences, "")
        .trim()
        .to_string()
}

/// Runs scripts in isolated child processes
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    interpreter: PathBuf,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl SandboxExecutor {
    /// Create an executor, auto-detecting the interpreter when not configured
    pub fn new(config: &ExecutorConfig) -> Result<Self, SandboxError> {
        let interpreter = match &config.interpreter {
            Some(path) if Self::verify_interpreter(path) => path.clone(),
            Some(path) => return Err(SandboxError::InterpreterNotRunnable(path.clone())),
            None => Self::find_interpreter()?,
        };

        info!("Sandbox using interpreter {:?}", interpreter);

        Ok(Self {
            interpreter,
            timeout: Duration::from_secs(config.timeout_secs),
            scratch_dir: config.scratch_dir.clone(),
        })
    }

    /// Create an executor for a known interpreter without probing it
    pub fn with_interpreter(interpreter: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
            scratch_dir: None,
        }
    }

    /// Place temporary script files in this directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Find python3/python in PATH
    fn find_interpreter() -> Result<PathBuf, SandboxError> {
        for candidate in ["python3", "python"] {
            let path = PathBuf::from(candidate);
            if Self::verify_interpreter(&path) {
                debug!("Found {} in PATH", candidate);
                return Ok(path);
            }
        }
        Err(SandboxError::InterpreterNotFound)
    }

    fn verify_interpreter(path: &Path) -> bool {
        StdCommand::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute code with the configured timeout
    pub async fn execute(&self, code: &str) -> ExecutionOutcome {
        self.execute_with_timeout(code, self.timeout).await
    }

    /// Execute code with an explicit timeout
    pub async fn execute_with_timeout(&self, code: &str, timeout: Duration) -> ExecutionOutcome {
        let code = clean_code(code);
        if code.is_empty() {
            warn!("{}", EMPTY_CODE_MESSAGE);
            return ExecutionOutcome::SetupFailed {
                message: EMPTY_CODE_MESSAGE.to_string(),
            };
        }

        let script = match self.materialize(&code) {
            Ok(path) => path,
            Err(e) => return setup_failure(&e),
        };
        debug!(path = ?script, "Script written to temporary file");

        let outcome = self.run(&script, timeout).await;

        // The temp path is removed on every exit path; failure here is not fatal
        let script_path = script.to_path_buf();
        if let Err(e) = script.close() {
            warn!(path = ?script_path, error = %e, "Could not delete temporary script");
        } else {
            debug!(path = ?script_path, "Temporary script deleted");
        }

        outcome
    }

    fn materialize(&self, code: &str) -> std::io::Result<tempfile::TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("analyst-").suffix(".py");
        let mut file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(code.as_bytes())?;
        file.flush()?;
        Ok(file.into_temp_path())
    }

    async fn run(&self, script: &Path, timeout: Duration) -> ExecutionOutcome {
        let child = Command::new(&self.interpreter)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => return setup_failure(&e),
        };

        let start = Instant::now();
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code();
                info!(
                    exit_code = ?exit_code,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Subprocess finished"
                );
                ExecutionOutcome::Completed {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code,
                }
            }
            Ok(Err(e)) => setup_failure(&e),
            Err(_) => {
                // Dropping the wait future drops the child, which kills it
                warn!(timeout_secs = timeout.as_secs(), "Subprocess timed out");
                ExecutionOutcome::TimedOut {
                    timeout_secs: timeout.as_secs(),
                }
            }
        }
    }
}

fn setup_failure(e: &std::io::Error) -> ExecutionOutcome {
    let message = format!(
        "{} Failed to execute code via subprocess. Error: {:?}",
        FAILURE_SENTINEL, e
    );
    warn!("{}", message);
    ExecutionOutcome::SetupFailed { message }
}
