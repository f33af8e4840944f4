use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use datacrew_core::IgnoreLock as _;

use super::{ExecutionOutput, Executor, ExecutorError, ExecutorResult};

/// One canned executor outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRun {
    /// The code ran and produced this output
    Output(ExecutionOutput),
    /// The submission timed out
    Timeout,
    /// The executor crashed
    Crash(String),
}

/// Executor replaying canned outcomes in order; the last one repeats.
///
/// With an empty script every submission succeeds with empty output.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    script: Arc<Mutex<VecDeque<ScriptedRun>>>,
    submissions: Arc<Mutex<Vec<String>>>,
    restarts: Arc<AtomicUsize>,
}

impl ScriptedExecutor {
    /// Creates an executor replaying `runs`.
    pub fn new(runs: impl IntoIterator<Item = ScriptedRun>) -> Self {
        Self {
            script: Arc::new(Mutex::new(runs.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Executor whose every submission succeeds with `stdout`.
    pub fn succeeding(stdout: impl Into<String>) -> Self {
        Self::new([ScriptedRun::Output(ExecutionOutput::ok(stdout))])
    }

    /// Code submitted so far, in order.
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock_ignore_poison().clone()
    }

    /// Number of restarts requested.
    pub fn restart_count(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    fn next_run(&self) -> Option<ScriptedRun> {
        let mut script = self.script.lock_ignore_poison();
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, code: &str) -> ExecutorResult<ExecutionOutput> {
        self.submissions.lock_ignore_poison().push(code.to_owned());
        match self.next_run() {
            None => Ok(ExecutionOutput::ok("")),
            Some(ScriptedRun::Output(output)) => Ok(output),
            Some(ScriptedRun::Timeout) => Err(ExecutorError::Timeout { after_ms: 0 }),
            Some(ScriptedRun::Crash(message)) => Err(ExecutorError::Crashed(message)),
        }
    }

    async fn restart(&self) -> ExecutorResult<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
