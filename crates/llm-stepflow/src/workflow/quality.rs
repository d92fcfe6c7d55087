//! Quality gate: the per-step execute, score, accept-or-retry cycle.
//!
//! One gate run walks `Build -> Execute -> Score -> {Accept | Retry}`:
//!
//! - **Build** asks the [`PromptAssembly`] for the base prompt and adds
//!   dependency context and discussion notes.
//! - **Execute** sends the prompt to the [`AgentExecutor`].
//! - **Score** sends a grading prompt and decodes the verdict leniently. An
//!   undecodable verdict becomes [`QualityScore::unparsed`], never an error.
//! - A score under the threshold with retries left rebuilds the prompt with
//!   the previous attempt attached and executes again. Otherwise the output
//!   is accepted and persisted.
//!
//! Executor failures at Execute or Score abort the gate run; only a low
//! score is retried here.

use super::executor::{StepJob, StepRunner};
use super::error::StepError;
use super::prompts::{
    DependencyOutput, ExecutionRequest, RetryRequest, ScoringRequest, ToPrompt, format_score,
};
use super::step::Step;
use crate::agent::{AgentExecutor, ScopeContext};
use crate::extract::LenientDecoder;
use crate::persistence::OutputPersistence;
use crate::prompt::{ProjectRecord, PromptAssembly, PromptOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Feedback text used when a verdict cannot be decoded.
pub const UNPARSED_FEEDBACK: &str = "could not parse evaluation";

/// Score substituted when a verdict cannot be decoded.
pub const UNPARSED_SCORE: f64 = 0.7;

/// A graded output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl QualityScore {
    /// Creates a score, clamping it into `[0, 1]`.
    pub fn new(score: f64, feedback: impl Into<String>) -> Self {
        Self {
            score: clamp_score(score),
            feedback: feedback.into(),
            issues: Vec::new(),
        }
    }

    pub fn with_issues<I, S>(mut self, issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issues = issues.into_iter().map(Into::into).collect();
        self
    }

    /// The fallback used when the scoring response cannot be decoded.
    pub fn unparsed() -> Self {
        Self::new(UNPARSED_SCORE, UNPARSED_FEEDBACK)
    }

    /// Decodes a scoring response, falling back to [`QualityScore::unparsed`].
    pub fn parse(response: &str, decoder: &LenientDecoder) -> Self {
        let mut score = decoder.decode_or(response, Self::unparsed);
        score.score = clamp_score(score.score);
        score
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

/// What the gate decided after scoring one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Retry,
}

/// Accept when the score clears the threshold or no retries remain.
pub fn decide(score: f64, threshold: f64, retry_count: u32, max_retries: u32) -> GateDecision {
    if score < threshold && retry_count < max_retries {
        GateDecision::Retry
    } else {
        GateDecision::Accept
    }
}

/// An output the gate accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedOutput {
    pub output: String,
    pub score: QualityScore,
    /// Prompt of the first attempt, reused by synthesis refinement.
    pub prompt: String,
}

/// Result of one gate run for one step.
#[derive(Debug)]
pub struct StepOutcome {
    pub step_id: String,
    pub step_name: String,
    /// Executor executions (not counting scoring calls).
    pub attempts: u32,
    pub retry_count: u32,
    pub result: Result<AcceptedOutput, StepError>,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub(crate) fn aborted(step: &Step, reason: impl Into<String>) -> Self {
        Self {
            step_id: step.id().to_string(),
            step_name: step.name().to_string(),
            attempts: 0,
            retry_count: 0,
            result: Err(StepError::Aborted(reason.into())),
        }
    }
}

#[derive(Debug, Default)]
struct AttemptState {
    attempts: u32,
    retry_count: u32,
}

/// Scores step outputs and drives the bounded retry loop.
pub struct QualityGate {
    executor: Arc<dyn AgentExecutor>,
    prompt_assembly: Arc<dyn PromptAssembly>,
    persistence: Option<Arc<dyn OutputPersistence>>,
    project: ProjectRecord,
    scope: ScopeContext,
    decoder: LenientDecoder,
    threshold: f64,
    max_retries: u32,
    uses_conversation_memory: bool,
}

impl QualityGate {
    pub fn new(
        executor: Arc<dyn AgentExecutor>,
        prompt_assembly: Arc<dyn PromptAssembly>,
    ) -> Self {
        Self {
            executor,
            prompt_assembly,
            persistence: None,
            project: ProjectRecord::default(),
            scope: ScopeContext::default(),
            decoder: LenientDecoder::new(),
            threshold: 0.8,
            max_retries: 2,
            uses_conversation_memory: false,
        }
    }

    pub fn with_persistence(mut self, persistence: Option<Arc<dyn OutputPersistence>>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_project(mut self, project: ProjectRecord) -> Self {
        self.project = project;
        self
    }

    pub fn with_scope(mut self, scope: ScopeContext) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_decoder(mut self, decoder: LenientDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_conversation_memory(mut self, enable: bool) -> Self {
        self.uses_conversation_memory = enable;
        self
    }

    /// Runs the full gate cycle for one step.
    pub async fn evaluate(
        &self,
        step: &Step,
        dependencies: Vec<(String, String)>,
        options: &PromptOptions,
    ) -> StepOutcome {
        let mut state = AttemptState::default();
        let result = self.run_attempts(step, dependencies, options, &mut state).await;

        StepOutcome {
            step_id: step.id().to_string(),
            step_name: step.name().to_string(),
            attempts: state.attempts,
            retry_count: state.retry_count,
            result,
        }
    }

    async fn run_attempts(
        &self,
        step: &Step,
        dependencies: Vec<(String, String)>,
        options: &PromptOptions,
        state: &mut AttemptState,
    ) -> Result<AcceptedOutput, StepError> {
        let prompt = self.build_prompt(step, dependencies, options).await?;
        let mut current_prompt = prompt.clone();

        loop {
            state.attempts += 1;

            let output = self
                .executor
                .execute(&current_prompt, &self.scope)
                .await
                .map_err(StepError::Execute)?;

            let score = self.score(step, &prompt, &output).await?;
            debug!(
                step_id = %step.id(),
                attempt = state.attempts,
                score = score.score,
                "Output scored"
            );

            match decide(score.score, self.threshold, state.retry_count, self.max_retries) {
                GateDecision::Retry => {
                    state.retry_count += 1;
                    info!(
                        step_id = %step.id(),
                        score = score.score,
                        retry = state.retry_count,
                        "Score below threshold, retrying"
                    );
                    current_prompt = RetryRequest {
                        original_prompt: prompt.clone(),
                        attempt: state.attempts,
                        score: format_score(score.score),
                        feedback: score.feedback.clone(),
                        issues: score.issues.clone(),
                        previous_output: output,
                    }
                    .to_prompt()?;
                }
                GateDecision::Accept => {
                    self.persist(step.id(), &output).await;
                    return Ok(AcceptedOutput {
                        output,
                        score,
                        prompt,
                    });
                }
            }
        }
    }

    async fn build_prompt(
        &self,
        step: &Step,
        dependencies: Vec<(String, String)>,
        options: &PromptOptions,
    ) -> Result<String, StepError> {
        let base_prompt = self
            .prompt_assembly
            .base_prompt(step.id(), step, &self.project, options)
            .await?;

        let request = ExecutionRequest {
            base_prompt,
            dependencies: dependencies
                .into_iter()
                .map(|(name, output)| DependencyOutput { name, output })
                .collect(),
            by_reference: self.uses_conversation_memory,
            discussion: step.discussion().to_vec(),
        };
        Ok(request.to_prompt()?)
    }

    async fn score(
        &self,
        step: &Step,
        task_prompt: &str,
        output: &str,
    ) -> Result<QualityScore, StepError> {
        let request = ScoringRequest {
            step_name: step.name().to_string(),
            task_prompt: task_prompt.to_string(),
            output: output.to_string(),
        };
        let response = self
            .executor
            .execute(&request.to_prompt()?, &self.scope)
            .await
            .map_err(StepError::Score)?;
        Ok(QualityScore::parse(&response, &self.decoder))
    }

    pub(crate) async fn persist(&self, step_id: &str, content: &str) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = persistence.save(step_id, content).await {
            warn!(step_id = %step_id, error = %e, "Failed to persist step output");
        }
    }
}

#[async_trait]
impl StepRunner for QualityGate {
    async fn run(&self, job: StepJob) -> StepOutcome {
        self.evaluate(&job.step, job.dependencies, &job.options).await
    }
}
