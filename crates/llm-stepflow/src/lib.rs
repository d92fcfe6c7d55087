//! `llm-stepflow` - dependency-gated, quality-graded orchestration of
//! multi-step LLM workflows.
//!
//! A workflow is a set of named steps with dependencies. The engine runs
//! every step whose dependencies are complete in parallel, grades each output
//! with a second agent call and retries weak results with feedback, then
//! reviews each batch as a whole and refines steps that conflict or leave
//! gaps. It repeats until every step is done, the graph deadlocks, a stop is
//! requested, or the iteration cap is hit.
//!
//! The engine owns no model client. Plug one in through
//! [`agent::AgentExecutor`]; prompts come from a [`prompt::PromptAssembly`]
//! and accepted outputs go to an optional [`persistence::OutputPersistence`].
//!
//! # Modules
//!
//! - [`workflow`]: graph, scheduler, quality gate, synthesis, orchestrator.
//! - [`agent`]: the executor trait plus a retrying wrapper.
//! - [`extract`]: lenient JSON extraction from free-text responses.
//! - [`prompt`]: base prompt assembly.
//! - [`persistence`]: output sinks.
//! - [`observability`]: tracing subscriber setup.

pub mod agent;
pub mod extract;
pub mod observability;
pub mod persistence;
pub mod prompt;
pub mod workflow;

pub use agent::{AgentExecutor, ExecutorError, ScopeContext};
pub use extract::{LenientDecoder, ParseError};
pub use persistence::{FilePersistence, InMemoryPersistence, OutputPersistence, PersistError};
pub use prompt::{ProjectRecord, PromptAssembly, PromptError, PromptOptions, TemplatePromptAssembly};
pub use workflow::{
    EngineConfig, OrchestratorError, QualityScore, RunOutcome, RunReport, RunState, Step,
    StepGraph, StepStatus, SynthesisResult, WorkflowOrchestrator,
};
