//! Error types for workflow runs.

use crate::agent::ExecutorError;
use crate::prompt::PromptError;
use thiserror::Error;

/// Fatal errors that end (or prevent) a workflow run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The graph or the engine wiring is invalid; raised before running.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No step is ready while incomplete steps remain.
    #[error("Deadlock: {} step(s) can never become ready: {}", .stuck.len(), .stuck.join(", "))]
    Deadlock {
        /// Names of every step still outside Complete/Skipped.
        stuck: Vec<String>,
    },

    /// The run is alive but did not finish within the iteration cap.
    #[error("Iteration cap exceeded after {iterations} iteration(s)")]
    IterationCapExceeded { iterations: u32 },

    /// `start` was called while a run is in progress.
    #[error("Workflow is already running")]
    AlreadyRunning,
}

impl OrchestratorError {
    pub fn dangling_dependency(step_id: &str, missing: &str) -> Self {
        Self::Configuration(format!(
            "Step '{}' depends on unknown step '{}'",
            step_id, missing
        ))
    }

    pub fn duplicate_step(step_id: &str) -> Self {
        Self::Configuration(format!("Duplicate step id '{}'", step_id))
    }

    pub fn unknown_step(step_id: &str) -> Self {
        Self::Configuration(format!("Unknown step id '{}'", step_id))
    }

    pub fn missing_prompt_assembly() -> Self {
        Self::Configuration("No prompt assembly collaborator configured".to_string())
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::Configuration(format!("Invalid engine config: {}", reason.into()))
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, Self::Deadlock { .. })
    }
}

/// Per-step failures; isolated to the step that raised them.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Prompt assembly failed: {0}")]
    Prompt(#[from] PromptError),

    #[error("Execution failed: {0}")]
    Execute(#[source] ExecutorError),

    #[error("Scoring failed: {0}")]
    Score(#[source] ExecutorError),

    #[error("Step task aborted: {0}")]
    Aborted(String),
}
