//! Tracing tests for WorkflowOrchestrator
//!
//! These tests verify that spans and structured events are emitted while a
//! workflow runs.

mod common;

use common::{ScriptedAgent, marker_assembly};
use llm_stepflow::workflow::{Step, StepGraph, WorkflowOrchestrator};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::FmtSpan;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// Captures tracing output to a string for verification
#[derive(Clone)]
struct TestWriter {
    output: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl TestWriter {
    fn new() -> Self {
        Self {
            output: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    fn get_output(&self) -> String {
        let bytes = self.output.lock().unwrap();
        String::from_utf8_lossy(&bytes).to_string()
    }
}

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.output.lock().unwrap().flush()
    }
}

impl<'a> MakeWriter<'a> for TestWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn orchestrator(agent: Arc<ScriptedAgent>) -> WorkflowOrchestrator {
    let graph = StepGraph::from_steps([
        Step::new("outline", "Outline"),
        Step::new("draft", "Draft").depends_on("outline"),
    ])
    .unwrap();
    WorkflowOrchestrator::new(graph, agent).with_prompt_assembly(marker_assembly())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_run_and_iteration_spans_created() {
    let writer = TestWriter::new();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_ansi(false)
        .with_writer(writer.clone())
        .finish();

    let _guard = tracing::subscriber::set_default(subscriber);

    orchestrator(Arc::new(ScriptedAgent::new()))
        .start("book-42", None)
        .await
        .unwrap();

    let output = writer.get_output();

    assert!(
        output.contains("workflow_run"),
        "Top-level span 'workflow_run' not found in output:\n{}",
        output
    );
    assert!(
        output.contains("workflow_id=book-42"),
        "Span should include workflow_id attribute in output:\n{}",
        output
    );
    assert!(
        output.contains("iteration{iteration=1}") && output.contains("iteration{iteration=2}"),
        "Each iteration should open its own span:\n{}",
        output
    );
    assert!(
        output.contains("Workflow completed"),
        "Completion should be logged:\n{}",
        output
    );
}

#[tokio::test]
async fn test_step_outcomes_logged_with_fields() {
    let writer = TestWriter::new();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .with_writer(writer.clone())
        .finish();

    let _guard = tracing::subscriber::set_default(subscriber);

    let agent = Arc::new(
        ScriptedAgent::new()
            .with_scores("outline", &[0.5, 0.95])
            .with_failures("draft", 1),
    );
    orchestrator(agent).start("wf", None).await.unwrap();

    let output = writer.get_output();

    assert!(
        output.contains("Step completed") && output.contains("step_id=outline"),
        "Completed steps should be logged with their id:\n{}",
        output
    );
    assert!(
        output.contains("Score below threshold, retrying"),
        "Quality retries should be logged:\n{}",
        output
    );
    assert!(
        output.contains("Step failed") && output.contains("draft failed"),
        "Hard failures should be logged with the error:\n{}",
        output
    );
}

#[tokio::test]
async fn test_deadlock_logged_as_error() {
    let writer = TestWriter::new();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_ansi(false)
        .with_writer(writer.clone())
        .finish();

    let _guard = tracing::subscriber::set_default(subscriber);

    let graph = StepGraph::from_steps([
        Step::new("a", "A").depends_on("b"),
        Step::new("b", "B").depends_on("a"),
    ])
    .unwrap();
    let result = WorkflowOrchestrator::new(graph, Arc::new(ScriptedAgent::new()))
        .with_prompt_assembly(marker_assembly())
        .start("wf", None)
        .await;

    assert!(result.is_err());
    let output = writer.get_output();
    assert!(
        output.contains("ERROR") && output.contains("No step can become ready"),
        "Deadlock should be logged at error level:\n{}",
        output
    );
}
