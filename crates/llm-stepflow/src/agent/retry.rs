//! Retry support for agent executors.

use super::{AgentExecutor, ExecutorError, ScopeContext};
use async_trait::async_trait;
use std::future::Future;

/// Executes an operation with bounded retry.
///
/// Only errors marked retryable are retried; the delay between attempts
/// comes from [`ExecutorError::retry_delay`].
///
/// # Arguments
///
/// * `max_attempts` - Total attempts, including the first one
/// * `operation` - An async closure performing one attempt
pub async fn retry_execution<F, Fut, T>(max_attempts: u32, operation: F) -> Result<T, ExecutorError>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ExecutorError>> + Send,
    T: Send,
{
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(output) => {
                if attempts > 1 {
                    log::info!(
                        "Operation succeeded on attempt {}/{}",
                        attempts,
                        max_attempts
                    );
                }
                return Ok(output);
            }
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                let delay = e.retry_delay(attempts);
                log::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempts,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    log::error!(
                        "Operation failed after {} attempts (retries exhausted): {}",
                        attempts,
                        e
                    );
                } else {
                    log::error!("Operation failed with non-retryable error: {}", e);
                }
                return Err(e);
            }
        }
    }
}

/// Decorator adding transient-failure retry to any executor.
///
/// ```rust,ignore
/// let executor = RetryingExecutor::new(MyBackend::new(), 2);
/// ```
pub struct RetryingExecutor<E: AgentExecutor> {
    inner: E,
    max_attempts: u32,
}

impl<E: AgentExecutor> RetryingExecutor<E> {
    /// Wraps `inner`, allowing up to `max_attempts` total attempts per call.
    pub fn new(inner: E, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts,
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[async_trait]
impl<E: AgentExecutor> AgentExecutor for RetryingExecutor<E> {
    async fn execute(&self, prompt: &str, scope: &ScopeContext) -> Result<String, ExecutorError> {
        let inner = &self.inner;
        retry_execution(self.max_attempts, || inner.execute(prompt, scope)).await
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
