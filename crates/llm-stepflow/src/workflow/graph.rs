//! Step graph: step records plus their dependency edges.
//!
//! The graph keeps steps in insertion order so that readiness enumeration is
//! deterministic. Cycles are allowed here; they surface at run time as a
//! deadlock. Only references to unknown step ids are rejected, by
//! [`StepGraph::validate`].

use super::error::OrchestratorError;
use super::step::{Step, StepStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ordered collection of steps for one workflow.
///
/// # Examples
///
/// ```rust
/// use llm_stepflow::workflow::{Step, StepGraph};
///
/// let mut graph = StepGraph::new();
/// graph.add_step(Step::new("outline", "Outline")).unwrap();
/// graph.add_step(Step::new("draft", "Draft").depends_on("outline")).unwrap();
///
/// assert!(graph.validate().is_ok());
/// assert_eq!(graph.dependents_of("outline"), vec!["draft"]);
/// ```
///
/// Serializes as the plain list of steps; deserializing rebuilds the id
/// lookup and rejects duplicate ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Step>", into = "Vec<Step>")]
pub struct StepGraph {
    steps: Vec<Step>,
    index: HashMap<String, usize>,
}

impl TryFrom<Vec<Step>> for StepGraph {
    type Error = OrchestratorError;

    fn try_from(steps: Vec<Step>) -> Result<Self, Self::Error> {
        Self::from_steps(steps)
    }
}

impl From<StepGraph> for Vec<Step> {
    fn from(graph: StepGraph) -> Self {
        graph.steps
    }
}

impl StepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from steps in the given order.
    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Result<Self, OrchestratorError> {
        let mut graph = Self::new();
        for step in steps {
            graph.add_step(step)?;
        }
        Ok(graph)
    }

    /// Appends a step. Duplicate ids are a configuration error.
    pub fn add_step(&mut self, step: Step) -> Result<(), OrchestratorError> {
        if self.index.contains_key(step.id()) {
            return Err(OrchestratorError::duplicate_step(step.id()));
        }
        self.index.insert(step.id().to_string(), self.steps.len());
        self.steps.push(step);
        Ok(())
    }

    /// Checks that every dependency names a step in this graph.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        for step in &self.steps {
            if let Some(missing) = step
                .dependencies()
                .iter()
                .find(|dep| !self.index.contains_key(dep.as_str()))
            {
                return Err(OrchestratorError::dangling_dependency(step.id(), missing));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in insertion order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, step_id: &str) -> Option<&Step> {
        self.index.get(step_id).map(|&i| &self.steps[i])
    }

    pub(crate) fn get_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        match self.index.get(step_id) {
            Some(&i) => self.steps.get_mut(i),
            None => None,
        }
    }

    pub fn status_of(&self, step_id: &str) -> Option<StepStatus> {
        self.get(step_id).map(Step::status)
    }

    /// True when every dependency of `step` is Complete.
    pub fn dependencies_complete(&self, step: &Step) -> bool {
        step.dependencies()
            .iter()
            .all(|dep| self.status_of(dep) == Some(StepStatus::Complete))
    }

    /// Ids of steps that declare a dependency on `step_id`, in insertion order.
    pub fn dependents_of(&self, step_id: &str) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.dependencies().iter().any(|d| d == step_id))
            .map(Step::id)
            .collect()
    }

    /// `(name, output)` of each dependency of `step`, in declared order.
    pub fn dependency_outputs(&self, step: &Step) -> Vec<(String, String)> {
        step.dependencies()
            .iter()
            .filter_map(|dep| self.get(dep))
            .map(|dep| (dep.name().to_string(), dep.output().to_string()))
            .collect()
    }

    /// Every step is Complete or Skipped.
    pub fn is_settled(&self) -> bool {
        self.steps.iter().all(|s| s.status().is_settled())
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status() == status).count()
    }

    /// Marks a step Skipped.
    pub fn skip_step(&mut self, step_id: &str) -> Result<(), OrchestratorError> {
        let step = self
            .get_mut(step_id)
            .ok_or_else(|| OrchestratorError::unknown_step(step_id))?;
        step.mark_skipped();
        Ok(())
    }

    /// Appends a discussion note that will be fed into the step's next prompt.
    pub fn add_discussion(
        &mut self,
        step_id: &str,
        note: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        let step = self
            .get_mut(step_id)
            .ok_or_else(|| OrchestratorError::unknown_step(step_id))?;
        step.push_discussion(note);
        Ok(())
    }

    /// Number of steps on the longest dependency chain, or `None` on a cycle.
    pub fn longest_chain(&self) -> Option<usize> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut on_stack = HashSet::new();

        for step in &self.steps {
            self.chain_depth(step.id(), &mut depth, &mut on_stack)?;
        }

        Some(depth.values().copied().max().unwrap_or(0))
    }

    fn chain_depth<'a>(
        &'a self,
        step_id: &'a str,
        depth: &mut HashMap<&'a str, usize>,
        on_stack: &mut HashSet<&'a str>,
    ) -> Option<usize> {
        if let Some(&d) = depth.get(step_id) {
            return Some(d);
        }
        if !on_stack.insert(step_id) {
            return None;
        }

        let mut deepest = 0;
        if let Some(step) = self.get(step_id) {
            for dep in step.dependencies() {
                deepest = deepest.max(self.chain_depth(dep, depth, on_stack)?);
            }
        }

        on_stack.remove(step_id);
        depth.insert(step_id, deepest + 1);
        Some(deepest + 1)
    }
}
