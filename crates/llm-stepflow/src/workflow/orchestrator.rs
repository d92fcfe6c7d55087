//! Orchestration loop: iterate until every step is settled.
//!
//! Each iteration is one superstep:
//!
//! 1. Compute the ready set. Empty with nothing left is completion; empty
//!    with steps left is a deadlock.
//! 2. Run the ready steps through the quality gate concurrently.
//! 3. Apply outcomes to the graph once every task has finished.
//! 4. With enough successes, run synthesis and one refinement pass.
//! 5. Honor a pending stop request, then check the iteration cap.
//!
//! Stop is cooperative and only observed at the end of an iteration.

use super::config::EngineConfig;
use super::error::OrchestratorError;
use super::events::{EventKind, EventRecorder, EventSink, ExecutionEvent};
use super::executor::{ParallelExecutor, StepJob};
use super::graph::StepGraph;
use super::quality::{QualityGate, StepOutcome};
use super::scheduler::{Liveness, check_liveness, compute_ready};
use super::step::{Step, StepStatus};
use super::synthesis::{SynthesisCoordinator, SynthesisInput};
use crate::agent::{AgentExecutor, ScopeContext};
use crate::persistence::OutputPersistence;
use crate::prompt::{ProjectRecord, PromptAssembly, PromptOptions};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
    Deadlocked,
    IterationCapExceeded,
    Failed,
}

/// How a run that returned `Ok` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step is Complete or Skipped.
    Completed,
    /// `stop` was requested; unfinished steps stay as they are.
    Stopped,
}

/// Summary returned by [`WorkflowOrchestrator::start`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub workflow_id: String,
    pub outcome: RunOutcome,
    pub iterations: u32,
    pub steps_completed: usize,
    pub steps_skipped: usize,
    /// The graph as it stood when the run ended.
    pub graph: StepGraph,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Accepted output of a step, if it completed.
    pub fn output_of(&self, step_id: &str) -> Option<&str> {
        self.graph
            .get(step_id)
            .filter(|s| s.is_complete())
            .map(Step::output)
    }
}

/// Drives a [`StepGraph`] to completion.
///
/// # Examples
///
/// ```rust,ignore
/// use llm_stepflow::prompt::TemplatePromptAssembly;
/// use llm_stepflow::workflow::{EngineConfig, Step, StepGraph, WorkflowOrchestrator};
/// use std::sync::Arc;
///
/// let graph = StepGraph::from_steps([
///     Step::new("outline", "Outline"),
///     Step::new("draft", "Draft").depends_on("outline"),
/// ])?;
///
/// let orchestrator = WorkflowOrchestrator::new(graph, Arc::new(my_executor))
///     .with_config(EngineConfig::new().with_quality_threshold(0.75))
///     .with_prompt_assembly(Arc::new(TemplatePromptAssembly::new()));
///
/// let report = orchestrator.start("wf-1", Some("A book about tides".into())).await?;
/// println!("{}", report.output_of("draft").unwrap_or_default());
/// ```
pub struct WorkflowOrchestrator {
    graph: AsyncMutex<StepGraph>,
    executor: Arc<dyn AgentExecutor>,
    prompt_assembly: Option<Arc<dyn PromptAssembly>>,
    persistence: Option<Arc<dyn OutputPersistence>>,
    project: ProjectRecord,
    scope: ScopeContext,
    config: EngineConfig,
    sinks: Vec<Arc<dyn EventSink>>,
    state: Mutex<RunState>,
    stop_token: Mutex<CancellationToken>,
    recorder: Mutex<Arc<EventRecorder>>,
}

impl WorkflowOrchestrator {
    pub fn new(graph: StepGraph, executor: Arc<dyn AgentExecutor>) -> Self {
        let config = EngineConfig::default();
        let recorder = Arc::new(EventRecorder::new(config.event_log_capacity, Vec::new()));
        Self {
            graph: AsyncMutex::new(graph),
            executor,
            prompt_assembly: None,
            persistence: None,
            project: ProjectRecord::default(),
            scope: ScopeContext::default(),
            config,
            sinks: Vec::new(),
            state: Mutex::new(RunState::Idle),
            stop_token: Mutex::new(CancellationToken::new()),
            recorder: Mutex::new(recorder),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_prompt_assembly(mut self, assembly: Arc<dyn PromptAssembly>) -> Self {
        self.prompt_assembly = Some(assembly);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn OutputPersistence>) -> Self {
        self.persistence = Some(persistence);
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

    /// Registers an observer for subsequent runs.
    pub fn add_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state.lock().map(|s| *s).unwrap_or(RunState::Failed)
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Requests a cooperative stop. Steps already executing finish; the
    /// loop exits at the end of the current iteration. No effect when idle.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        if let Ok(token) = self.stop_token.lock() {
            info!("Stop requested");
            token.cancel();
        }
    }

    /// Most recent events of the current or last run, oldest first.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.recorder
            .lock()
            .map(|r| r.snapshot())
            .unwrap_or_default()
    }

    /// Snapshot of the graph. Waits while a run holds it.
    pub async fn graph(&self) -> StepGraph {
        self.graph.lock().await.clone()
    }

    /// Marks a step Skipped before a run.
    pub fn skip_step(&self, step_id: &str) -> Result<(), OrchestratorError> {
        let mut graph = self
            .graph
            .try_lock()
            .map_err(|_| OrchestratorError::AlreadyRunning)?;
        graph.skip_step(step_id)
    }

    /// Adds a discussion note for a step's next prompt.
    pub fn add_discussion(
        &self,
        step_id: &str,
        note: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        let mut graph = self
            .graph
            .try_lock()
            .map_err(|_| OrchestratorError::AlreadyRunning)?;
        graph.add_discussion(step_id, note)
    }

    /// Runs the workflow until it completes, is stopped, or fails.
    ///
    /// `initial_input` seeds every root step that has no input of its own
    /// and is offered to prompt assembly for all steps.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::AlreadyRunning`] while another run is active.
    /// - [`OrchestratorError::Configuration`] for invalid wiring or graphs;
    ///   nothing is executed. Also raised if an outcome names a step that is
    ///   not in the graph.
    /// - [`OrchestratorError::Deadlock`] when unfinished steps can never
    ///   become ready.
    /// - [`OrchestratorError::IterationCapExceeded`] when steps remain after
    ///   `max_iterations` iterations.
    pub async fn start(
        &self,
        workflow_id: &str,
        initial_input: Option<String>,
    ) -> Result<RunReport, OrchestratorError> {
        if self.is_running() {
            return Err(OrchestratorError::AlreadyRunning);
        }
        let mut graph = self
            .graph
            .try_lock()
            .map_err(|_| OrchestratorError::AlreadyRunning)?;

        let prompt_assembly = match self.preflight(&graph) {
            Ok(assembly) => assembly,
            Err(e) => {
                error!(workflow_id = %workflow_id, error = %e, "Workflow configuration rejected");
                self.set_state(RunState::Failed);
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        if let Ok(mut slot) = self.stop_token.lock() {
            *slot = token.clone();
        }
        let recorder = Arc::new(EventRecorder::new(
            self.config.event_log_capacity,
            self.sinks.clone(),
        ));
        if let Ok(mut slot) = self.recorder.lock() {
            *slot = Arc::clone(&recorder);
        }
        self.set_state(RunState::Running);

        let span = info_span!("workflow_run", workflow_id = %workflow_id, steps = graph.len());
        let result = self
            .run(
                &mut graph,
                prompt_assembly,
                &recorder,
                &token,
                workflow_id,
                initial_input,
            )
            .instrument(span)
            .await;

        let final_state = match &result {
            Ok(report) => match report.outcome {
                RunOutcome::Completed => RunState::Completed,
                RunOutcome::Stopped => RunState::Stopped,
            },
            Err(OrchestratorError::Deadlock { .. }) => RunState::Deadlocked,
            Err(OrchestratorError::IterationCapExceeded { .. }) => RunState::IterationCapExceeded,
            Err(_) => RunState::Failed,
        };
        recorder.emit(0, EventKind::RunFinished, json!({ "state": final_state }));
        self.set_state(final_state);
        result
    }

    fn preflight(&self, graph: &StepGraph) -> Result<Arc<dyn PromptAssembly>, OrchestratorError> {
        self.config.validate()?;
        let assembly = self
            .prompt_assembly
            .clone()
            .ok_or_else(OrchestratorError::missing_prompt_assembly)?;
        graph.validate()?;
        Ok(assembly)
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut slot) = self.state.lock() {
            *slot = state;
        }
    }

    async fn run(
        &self,
        graph: &mut StepGraph,
        prompt_assembly: Arc<dyn PromptAssembly>,
        recorder: &EventRecorder,
        token: &CancellationToken,
        workflow_id: &str,
        initial_input: Option<String>,
    ) -> Result<RunReport, OrchestratorError> {
        seed_root_inputs(graph, initial_input.as_deref());

        let decoder = self.config.decoder();
        let gate = Arc::new(
            QualityGate::new(Arc::clone(&self.executor), prompt_assembly)
                .with_persistence(self.persistence.clone())
                .with_project(self.project.clone())
                .with_scope(self.scope.clone())
                .with_decoder(decoder.clone())
                .with_threshold(self.config.quality_threshold)
                .with_max_retries(self.config.max_quality_retries)
                .with_conversation_memory(self.config.uses_conversation_memory),
        );
        let executor =
            ParallelExecutor::new(gate).with_max_concurrent(self.config.max_concurrent_steps);
        let synthesis = SynthesisCoordinator::new(Arc::clone(&self.executor))
            .with_persistence(self.persistence.clone())
            .with_scope(self.scope.clone())
            .with_decoder(decoder)
            .with_min_successes(self.config.min_synthesis_successes);

        info!(
            steps = graph.len(),
            max_iterations = self.config.max_iterations,
            "Starting workflow"
        );

        let mut iteration: u32 = 0;
        loop {
            iteration += 1;
            recorder.emit(iteration, EventKind::IterationStart, json!({}));

            let ready: Vec<Step> = {
                let ready = compute_ready(graph);
                match check_liveness(graph, &ready) {
                    Liveness::Complete => {
                        info!(iterations = iteration, "Workflow completed");
                        return Ok(report(workflow_id, RunOutcome::Completed, iteration, graph));
                    }
                    Liveness::Deadlock(stuck) => {
                        error!(stuck = ?stuck, "No step can become ready");
                        return Err(OrchestratorError::Deadlock { stuck });
                    }
                    Liveness::Continue => ready.into_iter().cloned().collect(),
                }
            };

            self.run_iteration(
                graph,
                &executor,
                &synthesis,
                recorder,
                ready,
                PromptOptions {
                    workflow_id: workflow_id.to_string(),
                    initial_input: initial_input.clone(),
                    iteration,
                },
            )
            .instrument(info_span!("iteration", iteration))
            .await?;

            if token.is_cancelled() {
                info!(iterations = iteration, "Workflow stopped");
                return Ok(report(workflow_id, RunOutcome::Stopped, iteration, graph));
            }

            if iteration >= self.config.max_iterations {
                if graph.is_settled() {
                    info!(iterations = iteration, "Workflow completed at iteration cap");
                    return Ok(report(workflow_id, RunOutcome::Completed, iteration, graph));
                }
                error!(iterations = iteration, "Iteration cap exceeded");
                return Err(OrchestratorError::IterationCapExceeded {
                    iterations: iteration,
                });
            }
        }
    }

    async fn run_iteration(
        &self,
        graph: &mut StepGraph,
        executor: &ParallelExecutor<QualityGate>,
        synthesis: &SynthesisCoordinator,
        recorder: &EventRecorder,
        ready: Vec<Step>,
        options: PromptOptions,
    ) -> Result<(), OrchestratorError> {
        let iteration = options.iteration;
        let ready_ids: Vec<&str> = ready.iter().map(Step::id).collect();
        info!(ready = ?ready_ids, "Executing ready steps");
        recorder.emit(
            iteration,
            EventKind::ParallelStart,
            json!({ "steps": ready_ids }),
        );

        let jobs: Vec<StepJob> = ready
            .iter()
            .map(|step| {
                if let Some(s) = graph.get_mut(step.id()) {
                    s.mark_in_progress();
                }
                StepJob {
                    step: step.clone(),
                    dependencies: graph.dependency_outputs(step),
                    options: options.clone(),
                }
            })
            .collect();

        let outcomes = executor.run_batch(jobs).await;
        let successes = apply_outcomes(graph, recorder, iteration, outcomes)?;
        recorder.emit(
            iteration,
            EventKind::ParallelComplete,
            json!({
                "succeeded": successes.len(),
                "failed": ready.len() - successes.len(),
            }),
        );

        if !self.config.enable_synthesis || !synthesis.should_run(successes.len()) {
            debug!(successes = successes.len(), "Synthesis skipped");
            return Ok(());
        }

        recorder.emit(
            iteration,
            EventKind::SynthesisStart,
            json!({ "steps": successes.len() }),
        );
        let Some(result) = synthesis.synthesize(&successes).await else {
            return Ok(());
        };
        recorder.emit(
            iteration,
            EventKind::SynthesisComplete,
            json!({
                "conflicts": result.conflicts.len(),
                "gaps": result.gaps.len(),
                "redundancies": result.redundancies.len(),
                "improvements": result.improvements.len(),
                "summary": result.summary,
            }),
        );

        if !self.config.enable_refinement {
            return Ok(());
        }
        let mut refined = Vec::new();
        for refinement in synthesis.refine(&successes, &result).await {
            let Ok(output) = refinement.result else {
                continue;
            };
            if let Some(step) = graph.get_mut(&refinement.step_id)
                && step.is_complete()
            {
                step.replace_output(output);
                refined.push(refinement.step_id);
            }
        }
        if !refined.is_empty() {
            recorder.emit(
                iteration,
                EventKind::RefinementComplete,
                json!({ "steps": refined }),
            );
        }
        Ok(())
    }
}

/// Copies the run's initial input into root steps without their own input.
fn seed_root_inputs(graph: &mut StepGraph, initial_input: Option<&str>) {
    let Some(input) = initial_input.filter(|i| !i.is_empty()) else {
        return;
    };
    let roots: Vec<String> = graph
        .steps()
        .iter()
        .filter(|s| s.dependencies().is_empty() && s.input().is_empty())
        .map(|s| s.id().to_string())
        .collect();
    for id in roots {
        if let Some(step) = graph.get_mut(&id) {
            step.set_input(input);
        }
    }
}

/// Writes outcomes into the graph and returns the successful ones in batch
/// order. An outcome for a step the graph does not know is fatal.
fn apply_outcomes(
    graph: &mut StepGraph,
    recorder: &EventRecorder,
    iteration: u32,
    outcomes: Vec<StepOutcome>,
) -> Result<Vec<SynthesisInput>, OrchestratorError> {
    let mut successes = Vec::new();

    for outcome in outcomes {
        let Some(step) = graph.get_mut(&outcome.step_id) else {
            error!(step_id = %outcome.step_id, "Outcome for unknown step");
            return Err(OrchestratorError::unknown_step(&outcome.step_id));
        };

        match outcome.result {
            Ok(accepted) => {
                recorder.emit(
                    iteration,
                    EventKind::StepComplete,
                    json!({
                        "step_id": outcome.step_id,
                        "score": accepted.score.score,
                        "attempts": outcome.attempts,
                    }),
                );
                successes.push(SynthesisInput {
                    step_id: outcome.step_id,
                    step_name: outcome.step_name,
                    score: accepted.score.score,
                    output: accepted.output.clone(),
                    prompt: accepted.prompt,
                });
                step.accept(
                    accepted.output,
                    Some(accepted.score),
                    outcome.retry_count,
                    outcome.attempts,
                );
            }
            Err(e) => {
                let message = e.to_string();
                recorder.emit(
                    iteration,
                    EventKind::StepFailed,
                    json!({ "step_id": outcome.step_id, "error": message }),
                );
                step.fail(message, outcome.retry_count, outcome.attempts);
            }
        }
    }

    Ok(successes)
}

fn report(workflow_id: &str, outcome: RunOutcome, iterations: u32, graph: &StepGraph) -> RunReport {
    RunReport {
        workflow_id: workflow_id.to_string(),
        outcome,
        iterations,
        steps_completed: graph.count_with_status(StepStatus::Complete),
        steps_skipped: graph.count_with_status(StepStatus::Skipped),
        graph: graph.clone(),
    }
}
