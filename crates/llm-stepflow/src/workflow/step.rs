//! Step records.

use super::quality::QualityScore;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a step.
///
/// - `NotStarted` -> `InProgress` (scheduled in an iteration)
/// - `InProgress` -> `Complete` (output accepted by the quality gate)
/// - `InProgress` -> `NeedsRevision` (hard failure; scheduled again later)
/// - `NotStarted` -> `Skipped` (excluded before the run)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    NotStarted,
    InProgress,
    Complete,
    Skipped,
    NeedsRevision,
}

impl StepStatus {
    /// Complete or Skipped: the scheduler never picks the step again.
    pub fn is_settled(self) -> bool {
        matches!(self, StepStatus::Complete | StepStatus::Skipped)
    }
}

/// One schedulable unit of generative work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    id: String,
    name: String,
    dependencies: Vec<String>,
    status: StepStatus,
    input: String,
    output: String,
    retry_count: u32,
    last_quality_score: Option<QualityScore>,
    #[serde(default)]
    discussion: Vec<String>,
    #[serde(default)]
    last_error: Option<String>,
    #[serde(default)]
    attempts: u32,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            dependencies: Vec::new(),
            status: StepStatus::NotStarted,
            input: String::new(),
            output: String::new(),
            retry_count: 0,
            last_quality_score: None,
            discussion: Vec::new(),
            last_error: None,
            attempts: 0,
        }
    }

    /// Adds a dependency on `step_id`; repeated ids are ignored.
    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        let step_id = step_id.into();
        if !self.dependencies.contains(&step_id) {
            self.dependencies.push(step_id);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        deps.into_iter().fold(self, |step, dep| step.depends_on(dep))
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_discussion(mut self, note: impl Into<String>) -> Self {
        self.discussion.push(note.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Accepted output; empty until the step is Complete.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_quality_score(&self) -> Option<&QualityScore> {
        self.last_quality_score.as_ref()
    }

    pub fn discussion(&self) -> &[String] {
        &self.discussion
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Executor executions spent on the latest gate run.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_complete(&self) -> bool {
        self.status == StepStatus::Complete
    }

    pub(crate) fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub(crate) fn push_discussion(&mut self, note: impl Into<String>) {
        self.discussion.push(note.into());
    }

    pub(crate) fn mark_in_progress(&mut self) {
        self.status = StepStatus::InProgress;
    }

    pub(crate) fn mark_skipped(&mut self) {
        self.status = StepStatus::Skipped;
    }

    /// Records an accepted output; the only way into `Complete`.
    pub(crate) fn accept(
        &mut self,
        output: String,
        score: Option<QualityScore>,
        retry_count: u32,
        attempts: u32,
    ) {
        self.output = output;
        self.last_quality_score = score;
        self.retry_count = retry_count;
        self.attempts = attempts;
        self.last_error = None;
        self.status = StepStatus::Complete;
    }

    /// Records a hard failure; the step stays schedulable.
    pub(crate) fn fail(&mut self, error: String, retry_count: u32, attempts: u32) {
        self.last_error = Some(error);
        self.retry_count = retry_count;
        self.attempts = attempts;
        self.status = StepStatus::NeedsRevision;
    }

    /// Replaces the output of an already Complete step.
    pub(crate) fn replace_output(&mut self, output: String) {
        debug_assert!(self.is_complete());
        self.output = output;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_step_defaults() {
        let step = Step::new("intro", "Introduction");
        assert_eq!(step.id(), "intro");
        assert_eq!(step.name(), "Introduction");
        assert_eq!(step.status(), StepStatus::NotStarted);
        assert!(step.output().is_empty());
        assert_eq!(step.retry_count(), 0);
        assert!(step.last_quality_score().is_none());
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let step = Step::new("b", "B").with_dependencies(["a", "a", "c"]);
        assert_eq!(step.dependencies(), &["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_accept_completes_and_clears_error() {
        let mut step = Step::new("a", "A");
        step.fail("boom".to_string(), 1, 2);
        assert_eq!(step.status(), StepStatus::NeedsRevision);
        assert_eq!(step.last_error(), Some("boom"));

        step.accept("text".to_string(), Some(QualityScore::new(0.9, "ok")), 2, 3);
        assert!(step.is_complete());
        assert_eq!(step.output(), "text");
        assert_eq!(step.retry_count(), 2);
        assert_eq!(step.attempts(), 3);
        assert!(step.last_error().is_none());
    }

    #[test]
    fn test_settled_statuses() {
        assert!(StepStatus::Complete.is_settled());
        assert!(StepStatus::Skipped.is_settled());
        assert!(!StepStatus::NotStarted.is_settled());
        assert!(!StepStatus::InProgress.is_settled());
        assert!(!StepStatus::NeedsRevision.is_settled());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&StepStatus::NeedsRevision).unwrap();
        assert_eq!(json, "\"needs_revision\"");
    }
}
