//! Bounded-concurrency executor for one pipeline stage
//!
//! Every task of a stage is spawned onto a `JoinSet`, gated by a
//! semaphore sized to the configured concurrency. Each handler runs in its
//! own inner task so that a panic is caught and reported as
//! [`FailureKind::WorkerPanic`] for that task only.

use crate::crawler::task::{CrawlTask, FailureKind, StageKind, StageOutcome};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Run-level cancellation signal
///
/// Once set, pools stop issuing new tasks; tasks already in flight are
/// allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Every outcome of one stage run
#[derive(Debug)]
pub struct StageReport<P> {
    /// One outcome per input task, in completion order
    pub outcomes: Vec<StageOutcome<P>>,

    /// Highest number of handlers observed running at once
    pub peak_in_flight: usize,
}

impl<P> StageReport<P> {
    pub fn failures(&self) -> impl Iterator<Item = (&CrawlTask, &FailureKind)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|kind| (&o.task, kind)))
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }
}

/// Stage executor with a fixed concurrency limit
#[derive(Debug, Clone)]
pub struct StagePool {
    max_concurrency: usize,
    cancel: CancelFlag,
}

impl StagePool {
    pub fn new(max_concurrency: usize, cancel: CancelFlag) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            cancel,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs `handler` over every task and returns all outcomes
    ///
    /// Never short-circuits: a failing or panicking task is recorded and
    /// its siblings keep running. Tasks not yet started when the run is
    /// cancelled are reported as [`FailureKind::Cancelled`].
    pub async fn run<P, F, Fut>(&self, stage: StageKind, tasks: Vec<CrawlTask>, handler: F) -> StageReport<P>
    where
        P: Send + 'static,
        F: Fn(CrawlTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, FailureKind>> + Send + 'static,
    {
        let total = tasks.len();
        tracing::debug!(
            "Stage {} starting: {} tasks, concurrency {}",
            stage,
            total,
            self.max_concurrency
        );

        let handler = Arc::new(handler);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut outcomes = Vec::with_capacity(total);
        let mut workers = JoinSet::new();

        for task in tasks {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    outcomes.push(StageOutcome {
                        task,
                        result: Err(FailureKind::Cancelled),
                    });
                    continue;
                }
            };

            if self.cancel.is_cancelled() {
                outcomes.push(StageOutcome {
                    task,
                    result: Err(FailureKind::Cancelled),
                });
                continue;
            }

            let handler = Arc::clone(&handler);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);

            workers.spawn(async move {
                let _permit = permit;
                let running = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(running, Ordering::SeqCst);

                let input = task.clone();
                let result = match tokio::spawn(async move { handler(input).await }).await {
                    Ok(result) => result,
                    Err(e) => Err(FailureKind::WorkerPanic(describe_join_error(e))),
                };

                in_flight.fetch_sub(1, Ordering::SeqCst);
                StageOutcome { task, result }
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Stage {} worker lost: {}", stage, e),
            }
        }

        let report = StageReport {
            outcomes,
            peak_in_flight: peak.load(Ordering::SeqCst),
        };

        tracing::debug!(
            "Stage {} drained: {}/{} succeeded, peak in flight {}",
            stage,
            report.succeeded(),
            total,
            report.peak_in_flight
        );

        report
    }
}

fn describe_join_error(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }

    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
