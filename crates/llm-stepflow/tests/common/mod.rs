//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use llm_stepflow::agent::{AgentExecutor, ExecutorError, ScopeContext};
use llm_stepflow::persistence::{OutputPersistence, PersistError};
use llm_stepflow::prompt::TemplatePromptAssembly;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a prompt asked the agent to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Execute(String),
    Retry(String),
    Score(String),
    Synthesis,
    Refine(String),
}

/// Prompt assembly whose prompts carry a `STEP[id]` marker.
pub fn marker_assembly() -> Arc<TemplatePromptAssembly> {
    Arc::new(TemplatePromptAssembly::new().with_fallback("STEP[{{ step.id }}] {{ input }}"))
}

fn step_marker(prompt: &str) -> String {
    prompt
        .split_once("STEP[")
        .and_then(|(_, rest)| rest.split_once(']'))
        .map(|(id, _)| id.to_string())
        .unwrap_or_default()
}

fn classify(prompt: &str) -> Call {
    if prompt.starts_with("# Quality Evaluation Task") {
        Call::Score(step_marker(prompt))
    } else if prompt.starts_with("# Cross-Step Synthesis Task") {
        Call::Synthesis
    } else if prompt.contains("## Suggestions From Cross-Step Review") {
        Call::Refine(step_marker(prompt))
    } else if prompt.contains("## Previous Attempt") {
        Call::Retry(step_marker(prompt))
    } else {
        Call::Execute(step_marker(prompt))
    }
}

/// Agent that answers every kind of engine prompt from a script.
///
/// - Executions return `output:<id>#<n>` where `n` counts executions of
///   that step.
/// - Scores come from a per-step queue, defaulting to 0.9.
/// - Synthesis returns the scripted response, defaulting to an empty verdict.
/// - Refinements return `refined:<id>`.
#[derive(Default)]
pub struct ScriptedAgent {
    scores: Mutex<HashMap<String, VecDeque<f64>>>,
    failures: Mutex<HashMap<String, u32>>,
    executions: Mutex<HashMap<String, u32>>,
    synthesis: Mutex<Option<String>>,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_scores(self, step_id: &str, scores: &[f64]) -> Self {
        self.scores
            .lock()
            .unwrap()
            .insert(step_id.to_string(), scores.iter().copied().collect());
        self
    }

    /// The first `count` executions of `step_id` fail.
    pub fn with_failures(self, step_id: &str, count: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(step_id.to_string(), count);
        self
    }

    pub fn with_synthesis(self, response: &str) -> Self {
        *self.synthesis.lock().unwrap() = Some(response.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    /// Execute and Retry calls for one step.
    pub fn executions_of(&self, step_id: &str) -> usize {
        self.count(|c| matches!(c, Call::Execute(id) | Call::Retry(id) if id == step_id))
    }

    pub fn synthesis_calls(&self) -> usize {
        self.count(|c| *c == Call::Synthesis)
    }

    /// First execution prompt sent for `step_id`.
    pub fn execution_prompt(&self, step_id: &str) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .find(|p| classify(p) == Call::Execute(step_id.to_string()))
            .cloned()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn respond(&self, call: &Call) -> Result<String, ExecutorError> {
        match call {
            Call::Execute(id) | Call::Retry(id) => {
                if let Some(remaining) = self.failures.lock().unwrap().get_mut(id)
                    && *remaining > 0
                {
                    *remaining -= 1;
                    return Err(ExecutorError::ExecutionFailed(format!("{id} failed")));
                }
                let mut executions = self.executions.lock().unwrap();
                let n = executions.entry(id.clone()).or_default();
                *n += 1;
                Ok(format!("output:{id}#{n}"))
            }
            Call::Score(id) => {
                let score = self
                    .scores
                    .lock()
                    .unwrap()
                    .get_mut(id)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(0.9);
                Ok(format!(
                    r#"{{"score": {score}, "feedback": "scored {score}", "issues": []}}"#
                ))
            }
            Call::Synthesis => Ok(self
                .synthesis
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "{}".to_string())),
            Call::Refine(id) => Ok(format!("refined:{id}")),
        }
    }
}

#[async_trait]
impl AgentExecutor for ScriptedAgent {
    async fn execute(&self, prompt: &str, _scope: &ScopeContext) -> Result<String, ExecutorError> {
        let call = classify(prompt);
        self.calls.lock().unwrap().push(call.clone());
        self.prompts.lock().unwrap().push(prompt.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.respond(&call)
    }
}

/// Persistence that always fails.
pub struct BrokenPersistence;

#[async_trait]
impl OutputPersistence for BrokenPersistence {
    async fn save(&self, _step_id: &str, _content: &str) -> Result<(), PersistError> {
        Err(PersistError::Other("disk full".to_string()))
    }
}
