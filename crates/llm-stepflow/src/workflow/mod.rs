//! Workflow engine - dependency-gated, quality-graded step execution.
//!
//! A workflow is a [`StepGraph`] of named steps with dependency edges. The
//! [`WorkflowOrchestrator`] runs it in iterations: every step whose
//! dependencies are complete executes concurrently through the
//! [`QualityGate`], which scores each output and retries weak ones. After
//! each batch a [`SynthesisCoordinator`] may review the successful outputs
//! together and trigger one refinement pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_stepflow::prompt::TemplatePromptAssembly;
//! use llm_stepflow::workflow::{Step, StepGraph, WorkflowOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let graph = StepGraph::from_steps([
//!         Step::new("outline", "Outline"),
//!         Step::new("intro", "Introduction").depends_on("outline"),
//!         Step::new("body", "Body").depends_on("outline"),
//!         Step::new("conclusion", "Conclusion").with_dependencies(["intro", "body"]),
//!     ])?;
//!
//!     let orchestrator = WorkflowOrchestrator::new(graph, Arc::new(MyBackend::new()))
//!         .with_prompt_assembly(Arc::new(TemplatePromptAssembly::new()));
//!
//!     let report = orchestrator
//!         .start("article", Some("Rust async programming".to_string()))
//!         .await?;
//!     println!("finished in {} iterations", report.iterations);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod orchestrator;
pub(crate) mod prompts;
pub mod quality;
pub mod scheduler;
pub mod step;
pub mod synthesis;

pub use config::EngineConfig;
pub use error::{OrchestratorError, StepError};
pub use events::{ChannelEventSink, EventKind, EventLog, EventSink, ExecutionEvent};
pub use executor::{ParallelExecutor, StepJob, StepRunner};
pub use graph::StepGraph;
pub use orchestrator::{RunOutcome, RunReport, RunState, WorkflowOrchestrator};
pub use quality::{AcceptedOutput, GateDecision, QualityGate, QualityScore, StepOutcome};
pub use scheduler::{Liveness, check_liveness, compute_ready};
pub use step::{Step, StepStatus};
pub use synthesis::{
    Conflict, Improvement, Refinement, SynthesisCoordinator, SynthesisInput, SynthesisResult,
};
