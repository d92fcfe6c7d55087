//! Agent executor abstraction.
//!
//! Every call the engine makes to a text-generation backend goes through
//! [`AgentExecutor::execute`]: step execution, quality scoring, synthesis and
//! refinement all share the same shape and differ only in prompt content.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use llm_stepflow::agent::{AgentExecutor, ExecutorError, ScopeContext};
//!
//! struct HttpExecutor {
//!     endpoint: String,
//! }
//!
//! #[async_trait::async_trait]
//! impl AgentExecutor for HttpExecutor {
//!     async fn execute(
//!         &self,
//!         prompt: &str,
//!         scope: &ScopeContext,
//!     ) -> Result<String, ExecutorError> {
//!         // Call your backend here, using `scope.working_dir()` if relevant.
//!         todo!()
//!     }
//! }
//! ```
//!
//! Wrap a backend in [`RetryingExecutor`] to retry transient failures before
//! they surface to the engine as hard step failures.

pub mod error;
pub mod retry;

pub use error::ExecutorError;
pub use retry::{RetryingExecutor, retry_execution};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Opaque handle limiting the agent's operating context.
///
/// The engine never inspects it; it is forwarded unchanged on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeContext {
    working_dir: Option<PathBuf>,
    label: Option<String>,
}

impl ScopeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// The external text-generation service.
///
/// Implementations own their own timeout and backoff policy; the engine
/// awaits each call to completion.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Runs `prompt` within `scope` and returns the raw response text.
    async fn execute(&self, prompt: &str, scope: &ScopeContext) -> Result<String, ExecutorError>;

    /// Returns the name of this executor, used in logs.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("UnknownExecutor")
            .to_string()
    }
}
