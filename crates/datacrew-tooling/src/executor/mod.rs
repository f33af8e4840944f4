//! Code execution capability consumed by agents.

use std::io::Error as IoError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Subprocess-backed executor.
pub mod process;
/// Restart-and-retry wrapper.
pub mod restarting;
/// Scripted executor for tests and dry runs.
pub mod scripted;

pub use process::ProcessExecutor;
pub use restarting::RestartingExecutor;
pub use scripted::{ScriptedExecutor, ScriptedRun};

/// Errors raised by an executor itself, as opposed to failures of the submitted code.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The submission exceeded its wall-clock budget and was killed.
    #[error("Execution timed out after {after_ms}ms")]
    Timeout {
        /// Budget that was exceeded
        after_ms: u64,
    },

    /// The executor stopped working (lost kernel, broken pipe, ...).
    #[error("Executor crashed: {0}")]
    Crashed(String),

    /// The interpreter could not be started.
    #[error("Failed to spawn interpreter: {0}")]
    Spawn(String),

    /// Preparing the submission failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

impl ExecutorError {
    /// Internal failures are worth one restart; timeouts are not.
    pub const fn is_internal(&self) -> bool {
        !matches!(self, Self::Timeout { .. })
    }
}

/// Result type for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// What a finished submission produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Whether the code exited cleanly
    pub success: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit code; `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Wall-clock duration
    pub duration_ms: u64,
}

impl ExecutionOutput {
    /// Output of a clean run.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// Output of a run that exited with a runtime error.
    pub fn runtime_error(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }
}

/// Runs code on behalf of an agent.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Runs `code` to completion within the executor's time budget.
    ///
    /// A non-zero exit is reported through [`ExecutionOutput::success`], not as an error.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Timeout`] when the budget is exceeded and
    /// another variant when the executor itself fails.
    async fn run(&self, code: &str) -> ExecutorResult<ExecutionOutput>;

    /// Brings the executor back to a clean state after an internal failure.
    ///
    /// # Errors
    /// Returns an error if the executor cannot be restarted.
    async fn restart(&self) -> ExecutorResult<()> {
        Ok(())
    }
}
