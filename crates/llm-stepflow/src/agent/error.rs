//! Error types for the agent executor.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by an [`AgentExecutor`](super::AgentExecutor).
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The agent ran but reported a failure.
    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    /// Spawning or talking to the agent backend failed.
    #[error("Process error: {message}")]
    ProcessError {
        /// HTTP-like status code, when the backend exposes one.
        status_code: Option<u16>,
        message: String,
        /// Backend-suggested wait before the next attempt.
        retry_after: Option<Duration>,
    },

    /// I/O error while executing the agent.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A generic error for other cases.
    #[error("Agent error: {0}")]
    Other(String),
}

impl ExecutorError {
    /// Shorthand for a process error without status or retry hint.
    pub fn process(message: impl Into<String>) -> Self {
        Self::ProcessError {
            status_code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Check if this error should trigger an automatic retry.
    ///
    /// Process and I/O failures are transient; a failed execution or an
    /// unknown error is reported to the caller immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutorError::ProcessError { .. } | ExecutorError::IoError(_)
        )
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Honours `retry_after` when present, otherwise exponential backoff
    /// from 500ms capped at 8s, plus up to 250ms of jitter.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if let ExecutorError::ProcessError {
            retry_after: Some(after),
            ..
        } = self
        {
            return *after;
        }

        let exponent = attempt.saturating_sub(1).min(4);
        let base = Duration::from_millis(500 * (1u64 << exponent));
        let jitter = Duration::from_millis(rand::random::<u64>() % 250);
        base + jitter
    }
}
