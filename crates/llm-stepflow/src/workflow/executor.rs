//! Parallel executor: runs one iteration's ready steps concurrently.
//!
//! Every job carries an owned snapshot of its step and its dependency
//! outputs, so tasks share nothing mutable. The executor only returns
//! outcomes; the caller applies them to the graph after the barrier.

use super::quality::StepOutcome;
use super::step::Step;
use crate::prompt::PromptOptions;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info, info_span};

/// One unit of work handed to a [`StepRunner`].
#[derive(Debug, Clone)]
pub struct StepJob {
    pub step: Step,
    /// `(name, output)` of each dependency, in declared order.
    pub dependencies: Vec<(String, String)>,
    pub options: PromptOptions,
}

/// Runs a single step to an outcome. Implementations must not panic on
/// ordinary failures; a panic is still isolated to its own step.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, job: StepJob) -> StepOutcome;
}

/// Fans a batch of jobs out to tokio tasks and joins them.
pub struct ParallelExecutor<R: ?Sized> {
    runner: Arc<R>,
    max_concurrent: Option<usize>,
}

impl<R> ParallelExecutor<R>
where
    R: StepRunner + ?Sized + 'static,
{
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            max_concurrent: None,
        }
    }

    /// Caps how many jobs run at once. `None` runs the whole batch together.
    pub fn with_max_concurrent(mut self, max: Option<usize>) -> Self {
        self.max_concurrent = max.map(|m| m.max(1));
        self
    }

    /// Runs every job and returns one outcome per job, in job order.
    pub async fn run_batch(&self, jobs: Vec<StepJob>) -> Vec<StepOutcome> {
        let semaphore = self.max_concurrent.map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = Vec::with_capacity(jobs.len());

        for job in jobs {
            let step = job.step.clone();
            let runner = Arc::clone(&self.runner);
            let semaphore = semaphore.clone();
            let step_span = info_span!("step", step_id = %step.id(), step_name = %step.name());

            let task = tokio::spawn(
                async move {
                    // The permit lives until the outcome is produced.
                    let _permit = match semaphore {
                        Some(sem) => sem.acquire_owned().await.ok(),
                        None => None,
                    };
                    runner.run(job).await
                }
                .instrument(step_span),
            );
            tasks.push((step, task));
        }

        // Wait for all tasks
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (step, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(step_id = %step.id(), error = %e, "Step task did not finish");
                    StepOutcome::aborted(&step, e.to_string())
                }
            };
            log_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }
}

fn log_outcome(outcome: &StepOutcome) {
    match &outcome.result {
        Ok(accepted) => info!(
            step_id = %outcome.step_id,
            score = accepted.score.score,
            attempts = outcome.attempts,
            "Step completed"
        ),
        Err(e) => error!(
            step_id = %outcome.step_id,
            error = %e,
            "Step failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::error::StepError;
    use crate::workflow::quality::{AcceptedOutput, QualityScore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the step id; panics on `panic`, fails on `fail`.
    #[derive(Default)]
    struct EchoRunner {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl StepRunner for EchoRunner {
        async fn run(&self, job: StepJob) -> StepOutcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let result = match job.step.id() {
                "panic" => panic!("runner blew up"),
                "fail" => Err(StepError::Aborted("scripted".to_string())),
                id => Ok(AcceptedOutput {
                    output: format!("out-{id}"),
                    score: QualityScore::new(0.9, "ok"),
                    prompt: String::new(),
                }),
            };
            StepOutcome {
                step_id: job.step.id().to_string(),
                step_name: job.step.name().to_string(),
                attempts: 1,
                retry_count: 0,
                result,
            }
        }
    }

    fn job(id: &str) -> StepJob {
        StepJob {
            step: Step::new(id, id.to_uppercase()),
            dependencies: Vec::new(),
            options: PromptOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_outcomes_follow_job_order() {
        let executor = ParallelExecutor::new(Arc::new(EchoRunner::default()));
        let outcomes = executor
            .run_batch(vec![job("c"), job("a"), job("b")])
            .await;

        let ids: Vec<&str> = outcomes.iter().map(|o| o.step_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert!(outcomes.iter().all(StepOutcome::is_success));
    }

    #[tokio::test]
    async fn test_runs_concurrently_without_limit() {
        let runner = Arc::new(EchoRunner::default());
        let executor = ParallelExecutor::new(runner.clone());
        executor
            .run_batch(vec![job("a"), job("b"), job("c"), job("d")])
            .await;
        assert_eq!(runner.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let runner = Arc::new(EchoRunner::default());
        let executor = ParallelExecutor::new(runner.clone()).with_max_concurrent(Some(2));
        let outcomes = executor
            .run_batch(vec![job("a"), job("b"), job("c"), job("d"), job("e")])
            .await;
        assert_eq!(outcomes.len(), 5);
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_isolated() {
        let executor = ParallelExecutor::new(Arc::new(EchoRunner::default()));
        let outcomes = executor
            .run_batch(vec![job("a"), job("panic"), job("fail"), job("b")])
            .await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_success());
        assert!(matches!(outcomes[1].result, Err(StepError::Aborted(_))));
        assert_eq!(outcomes[1].step_id, "panic");
        assert!(!outcomes[2].is_success());
        assert_eq!(outcomes[3].result.as_ref().unwrap().output, "out-b");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let executor = ParallelExecutor::new(Arc::new(EchoRunner::default()));
        assert!(executor.run_batch(Vec::new()).await.is_empty());
    }
}
