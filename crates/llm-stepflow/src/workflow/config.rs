//! Configuration for workflow runs.
//!
//! This module provides the knobs controlling iteration limits, the quality
//! gate, synthesis and concurrency.

use crate::extract::{BraceScan, LenientDecoder};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::OrchestratorError;

/// Configuration for the orchestration engine.
///
/// # Examples
///
/// ```rust
/// use llm_stepflow::workflow::EngineConfig;
///
/// let config = EngineConfig::new()
///     .with_max_iterations(20)
///     .with_quality_threshold(0.75)
///     .with_max_concurrent_steps(4);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Safety cap on iterations.
    ///
    /// Reaching it while steps remain is fatal (`IterationCapExceeded`),
    /// distinct from a deadlock: the graph is alive, only too long or slow.
    ///
    /// **Default:** 50
    pub max_iterations: u32,

    /// Minimum quality score for an output to be accepted without retry.
    ///
    /// **Default:** 0.8
    pub quality_threshold: f64,

    /// Quality retries after the first attempt.
    ///
    /// **Counting behavior:**
    /// - `max_quality_retries = 2` allows 3 total executions (initial + 2 retries)
    /// - When the counter reaches the limit, the last output is accepted
    ///
    /// **Default:** 2
    pub max_quality_retries: u32,

    /// Minimum successful steps in a batch before synthesis runs.
    ///
    /// **Default:** 2
    pub min_synthesis_successes: usize,

    /// Run the cross-step synthesis pass.
    ///
    /// **Default:** `true`
    pub enable_synthesis: bool,

    /// Apply synthesis improvement suggestions with one refinement call per step.
    ///
    /// **Default:** `true`
    pub enable_refinement: bool,

    /// When set, dependency outputs are referenced by name only, assuming
    /// the agent keeps them in its own conversation memory.
    ///
    /// **Default:** `false` (outputs are inlined verbatim)
    pub uses_conversation_memory: bool,

    /// Maximum steps executing at once within an iteration.
    ///
    /// If `None`, every ready step runs concurrently.
    pub max_concurrent_steps: Option<usize>,

    /// Number of execution events retained in the ring buffer.
    ///
    /// **Default:** 100
    pub event_log_capacity: usize,

    /// How JSON is located in scoring and synthesis responses.
    ///
    /// **Default:** [`BraceScan::Greedy`]
    pub brace_scan: BraceScan,

    /// Retry a failed decode after repairing common JSON syntax slips.
    ///
    /// **Default:** `false`
    pub repair_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_iterations: 50,
            quality_threshold: 0.8,
            max_quality_retries: 2,
            min_synthesis_successes: 2,
            enable_synthesis: true,
            enable_refinement: true,
            uses_conversation_memory: false,
            max_concurrent_steps: None,
            event_log_capacity: 100,
            brace_scan: BraceScan::Greedy,
            repair_json: false,
        }
    }

    /// Parses a configuration from JSON; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, OrchestratorError> {
        serde_json::from_str(json).map_err(|e| OrchestratorError::invalid_config(e.to_string()))
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(OrchestratorError::invalid_config(format!(
                "quality_threshold must be within [0, 1], got {}",
                self.quality_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(OrchestratorError::invalid_config(
                "max_iterations must be at least 1",
            ));
        }
        if self.event_log_capacity == 0 {
            return Err(OrchestratorError::invalid_config(
                "event_log_capacity must be at least 1",
            ));
        }
        if self.max_concurrent_steps == Some(0) {
            return Err(OrchestratorError::invalid_config(
                "max_concurrent_steps must be at least 1 when set",
            ));
        }
        Ok(())
    }

    /// Decoder for scoring and synthesis responses.
    pub fn decoder(&self) -> LenientDecoder {
        LenientDecoder::new()
            .with_scan(self.brace_scan)
            .with_repair(self.repair_json)
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_max_quality_retries(mut self, retries: u32) -> Self {
        self.max_quality_retries = retries;
        self
    }

    pub fn with_min_synthesis_successes(mut self, min: usize) -> Self {
        self.min_synthesis_successes = min;
        self
    }

    pub fn with_synthesis(mut self, enable: bool) -> Self {
        self.enable_synthesis = enable;
        self
    }

    pub fn with_refinement(mut self, enable: bool) -> Self {
        self.enable_refinement = enable;
        self
    }

    pub fn with_conversation_memory(mut self, enable: bool) -> Self {
        self.uses_conversation_memory = enable;
        self
    }

    pub fn with_max_concurrent_steps(mut self, max: usize) -> Self {
        self.max_concurrent_steps = Some(max);
        self
    }

    /// Removes the concurrency limit.
    pub fn with_unlimited_concurrency(mut self) -> Self {
        self.max_concurrent_steps = None;
        self
    }

    pub fn with_event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = capacity;
        self
    }

    pub fn with_brace_scan(mut self, scan: BraceScan) -> Self {
        self.brace_scan = scan;
        self
    }

    pub fn with_json_repair(mut self, enable: bool) -> Self {
        self.repair_json = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.quality_threshold, 0.8);
        assert_eq!(config.max_quality_retries, 2);
        assert_eq!(config.min_synthesis_successes, 2);
        assert!(config.enable_synthesis);
        assert!(config.enable_refinement);
        assert!(!config.uses_conversation_memory);
        assert!(config.max_concurrent_steps.is_none());
        assert_eq!(config.event_log_capacity, 100);
        assert_eq!(config.brace_scan, BraceScan::Greedy);
        assert!(!config.repair_json);
    }

    #[test]
    fn test_builder_chain() {
        let config = EngineConfig::new()
            .with_max_iterations(10)
            .with_max_concurrent_steps(3)
            .with_conversation_memory(true)
            .with_brace_scan(BraceScan::Balanced);

        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.max_concurrent_steps, Some(3));
        assert!(config.uses_conversation_memory);
        assert_eq!(config.brace_scan, BraceScan::Balanced);

        let unlimited = config.with_unlimited_concurrency();
        assert!(unlimited.max_concurrent_steps.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::new().with_quality_threshold(1.5).validate().is_err());
        assert!(EngineConfig::new().with_max_iterations(0).validate().is_err());
        assert!(EngineConfig::new().with_event_log_capacity(0).validate().is_err());
        assert!(EngineConfig::new().with_max_concurrent_steps(0).validate().is_err());
        assert!(EngineConfig::new().validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_uses_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"max_iterations": 7, "brace_scan": "balanced"}"#)
                .unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.brace_scan, BraceScan::Balanced);
        assert_eq!(config.quality_threshold, 0.8);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let err = EngineConfig::from_json_str(r#"{"max_iteration": 7}"#).unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"enable_synthesis": false}"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert!(!config.enable_synthesis);

        assert!(EngineConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
