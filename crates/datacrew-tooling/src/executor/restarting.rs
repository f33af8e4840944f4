use async_trait::async_trait;
use tracing::warn;

use super::{ExecutionOutput, Executor, ExecutorResult};

/// Restarts the wrapped executor once after an internal failure and retries the submission.
///
/// Timeouts and runtime errors of the submitted code are passed through untouched.
#[derive(Debug, Clone)]
pub struct RestartingExecutor<E> {
    inner: E,
}

impl<E: Executor> RestartingExecutor<E> {
    /// Wraps `inner`.
    pub const fn new(inner: E) -> Self {
        Self { inner }
    }

    /// The wrapped executor.
    pub const fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: Executor> Executor for RestartingExecutor<E> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn run(&self, code: &str) -> ExecutorResult<ExecutionOutput> {
        match self.inner.run(code).await {
            Err(error) if error.is_internal() => {
                warn!(
                    "{} executor failed ({}), restarting and retrying once",
                    self.inner.name(),
                    error
                );
                self.inner.restart().await?;
                self.inner.run(code).await
            }
            other => other,
        }
    }

    async fn restart(&self) -> ExecutorResult<()> {
        self.inner.restart().await
    }
}
