//! Readiness and liveness queries over a [`StepGraph`].

use super::graph::StepGraph;
use super::step::Step;

/// Outcome of a liveness check at the start of an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// Every step is Complete or Skipped.
    Complete,
    /// Nothing is ready but these steps (by name) remain unsettled.
    Deadlock(Vec<String>),
    /// At least one step is ready.
    Continue,
}

/// Steps whose status is not Complete/Skipped and whose dependencies are
/// all Complete, in insertion order.
pub fn compute_ready(graph: &StepGraph) -> Vec<&Step> {
    graph
        .steps()
        .iter()
        .filter(|step| !step.status().is_settled() && graph.dependencies_complete(step))
        .collect()
}

/// Classifies the graph given this iteration's ready set.
pub fn check_liveness(graph: &StepGraph, ready: &[&Step]) -> Liveness {
    if !ready.is_empty() {
        return Liveness::Continue;
    }

    let stuck: Vec<String> = graph
        .steps()
        .iter()
        .filter(|step| !step.status().is_settled())
        .map(|step| step.name().to_string())
        .collect();

    if stuck.is_empty() {
        Liveness::Complete
    } else {
        Liveness::Deadlock(stuck)
    }
}
