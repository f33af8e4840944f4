//! Runs submissions with a local interpreter.
//!
//! Provides no isolation: only point it at code you are prepared to run on the host.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use datacrew_core::ExecutorConfig;
use tempfile::Builder as TempBuilder;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{ExecutionOutput, Executor, ExecutorError, ExecutorResult};

/// Executor that writes each submission to a temporary script and runs the interpreter on it.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Interpreter command; the script path is appended
    interpreter: Vec<String>,
    /// Wall-clock budget per submission
    timeout: Duration,
    /// Working directory of the interpreter
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    /// Creates an executor running `interpreter` with the given budget.
    pub fn new(interpreter: Vec<String>, timeout: Duration) -> Self {
        Self {
            interpreter,
            timeout,
            working_dir: None,
        }
    }

    /// Builds an executor from the `[executor]` config section.
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            timeout: config.timeout(),
            working_dir: config.working_dir.clone(),
        }
    }

    /// Sets the working directory used for every run.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run(&self, code: &str) -> ExecutorResult<ExecutionOutput> {
        let (program, args) = self
            .interpreter
            .split_first()
            .ok_or_else(|| ExecutorError::Spawn("no interpreter configured".to_owned()))?;

        let mut script = TempBuilder::new()
            .prefix("datacrew-")
            .suffix(".py")
            .tempfile()?;
        script.write_all(code.as_bytes())?;
        script.flush()?;

        debug!(
            "Running {} line submission with {}",
            code.lines().count(),
            program
        );

        let mut command = Command::new(program);
        command
            .args(args)
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let child = command
            .spawn()
            .map_err(|err| ExecutorError::Spawn(format!("{program}: {err}")))?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_elapsed| ExecutorError::Timeout {
                after_ms: self.timeout_ms(),
            })?
            .map_err(|err| ExecutorError::Crashed(format!("lost interpreter process: {err}")))?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let exit_code = output.status.code();
        debug!("Submission finished with exit code {:?}", exit_code);

        Ok(ExecutionOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
            duration_ms,
        })
    }
}
