//! Cross-step synthesis and the refinement pass it drives.
//!
//! After a batch with enough successful steps, one agent call reviews all
//! successful outputs together. Improvements it names are applied with a
//! single refinement call per affected step. Synthesis is advisory: a failed
//! or undecodable synthesis never fails the batch, and a failed refinement
//! keeps the previous output.

use super::prompts::{
    SynthesisEntry, SynthesisRefinementRequest, SynthesisRequest, ToPrompt, format_score,
};
use crate::agent::{AgentExecutor, ExecutorError, ScopeContext};
use crate::extract::LenientDecoder;
use crate::persistence::OutputPersistence;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A contradiction reported between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(default)]
    pub step_name: String,
    #[serde(default)]
    pub issue: String,
}

/// A concrete change proposed for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Improvement {
    #[serde(default)]
    pub step_name: String,
    #[serde(default)]
    pub suggestion: String,
}

/// Decoded synthesis verdict. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SynthesisResult {
    pub conflicts: Vec<Conflict>,
    pub gaps: Vec<String>,
    pub redundancies: Vec<String>,
    pub improvements: Vec<Improvement>,
    pub summary: String,
}

impl SynthesisResult {
    /// Decodes a synthesis response, falling back to an empty result.
    pub fn parse(response: &str, decoder: &LenientDecoder) -> Self {
        decoder.decode_or(response, Self::default)
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
            && self.gaps.is_empty()
            && self.redundancies.is_empty()
            && self.improvements.is_empty()
            && self.summary.is_empty()
    }

    /// Non-empty suggestions grouped by the step name they target, in
    /// response order.
    pub fn suggestions_by_step(&self) -> HashMap<&str, Vec<&str>> {
        let mut grouped: HashMap<&str, Vec<&str>> = HashMap::new();
        for improvement in &self.improvements {
            let suggestion = improvement.suggestion.trim();
            if improvement.step_name.is_empty() || suggestion.is_empty() {
                continue;
            }
            grouped
                .entry(improvement.step_name.as_str())
                .or_default()
                .push(suggestion);
        }
        grouped
    }
}

/// A successful step output offered to synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisInput {
    pub step_id: String,
    pub step_name: String,
    pub score: f64,
    pub output: String,
    /// Prompt the output was produced from.
    pub prompt: String,
}

/// Result of one refinement call.
#[derive(Debug)]
pub struct Refinement {
    pub step_id: String,
    pub suggestions: usize,
    pub result: Result<String, ExecutorError>,
}

/// Runs synthesis and refinement for one batch.
pub struct SynthesisCoordinator {
    executor: Arc<dyn AgentExecutor>,
    persistence: Option<Arc<dyn OutputPersistence>>,
    scope: ScopeContext,
    decoder: LenientDecoder,
    min_successes: usize,
}

impl SynthesisCoordinator {
    pub fn new(executor: Arc<dyn AgentExecutor>) -> Self {
        Self {
            executor,
            persistence: None,
            scope: ScopeContext::default(),
            decoder: LenientDecoder::new(),
            min_successes: 2,
        }
    }

    pub fn with_persistence(mut self, persistence: Option<Arc<dyn OutputPersistence>>) -> Self {
        self.persistence = persistence;
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

    pub fn with_min_successes(mut self, min: usize) -> Self {
        self.min_successes = min;
        self
    }

    /// Synthesis is worth running only with several successful outputs.
    pub fn should_run(&self, successes: usize) -> bool {
        successes >= self.min_successes.max(2)
    }

    /// Reviews `successes` together. Returns `None` when the batch is too
    /// small or the agent call fails; an undecodable response yields an
    /// empty result.
    pub async fn synthesize(&self, successes: &[SynthesisInput]) -> Option<SynthesisResult> {
        if !self.should_run(successes.len()) {
            return None;
        }

        let request = SynthesisRequest {
            entries: successes
                .iter()
                .map(|s| SynthesisEntry {
                    name: s.step_name.clone(),
                    score: format_score(s.score),
                    output: s.output.clone(),
                })
                .collect(),
        };
        let prompt = match request.to_prompt() {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "Failed to render synthesis prompt");
                return None;
            }
        };

        match self.executor.execute(&prompt, &self.scope).await {
            Ok(response) => {
                let result = SynthesisResult::parse(&response, &self.decoder);
                debug!(
                    conflicts = result.conflicts.len(),
                    gaps = result.gaps.len(),
                    improvements = result.improvements.len(),
                    "Synthesis decoded"
                );
                Some(result)
            }
            Err(e) => {
                warn!(error = %e, "Synthesis call failed, continuing without it");
                None
            }
        }
    }

    /// Applies suggestions with one concurrent refinement call per targeted
    /// step. Steps with no suggestions are left alone. Successful
    /// refinements are persisted before they are returned.
    pub async fn refine(
        &self,
        successes: &[SynthesisInput],
        synthesis: &SynthesisResult,
    ) -> Vec<Refinement> {
        let grouped = synthesis.suggestions_by_step();
        if grouped.is_empty() {
            return Vec::new();
        }

        // Names win; an id only matches suggestions whose target names no step.
        let names: HashSet<&str> = successes.iter().map(|s| s.step_name.as_str()).collect();
        let calls = successes.iter().filter_map(|input| {
            let mut suggestions = grouped
                .get(input.step_name.as_str())
                .cloned()
                .unwrap_or_default();
            if !names.contains(input.step_id.as_str())
                && let Some(by_id) = grouped.get(input.step_id.as_str())
            {
                suggestions.extend(by_id);
            }
            if suggestions.is_empty() {
                return None;
            }
            Some(self.refine_one(input, suggestions))
        });

        join_all(calls).await
    }

    async fn refine_one(&self, input: &SynthesisInput, suggestions: Vec<&str>) -> Refinement {
        let request = SynthesisRefinementRequest {
            original_prompt: input.prompt.clone(),
            previous_output: input.output.clone(),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        };

        let result = match request.to_prompt() {
            Ok(prompt) => self.executor.execute(&prompt, &self.scope).await,
            Err(e) => Err(ExecutorError::Other(e.to_string())),
        };

        match &result {
            Ok(output) => {
                info!(step_id = %input.step_id, suggestions = suggestions.len(), "Step refined");
                if let Some(persistence) = &self.persistence
                    && let Err(e) = persistence.save(&input.step_id, output).await
                {
                    warn!(step_id = %input.step_id, error = %e, "Failed to persist refined output");
                }
            }
            Err(e) => {
                warn!(step_id = %input.step_id, error = %e, "Refinement failed, keeping previous output");
            }
        }

        Refinement {
            step_id: input.step_id.clone(),
            suggestions: suggestions.len(),
            result,
        }
    }
}
