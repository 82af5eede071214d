//! Drives an [`Executor`] from many concurrent workers.
//!
//! Every worker sends requests strictly one after another and records each latency into a
//! [`LatencyHistogram`] shared by the whole run. The run terminates by one of two policies:
//!
//!  - [`Termination::Count`]: every worker sends a fixed number of requests, and the run completes
//!    once all of them have finished.
//!  - [`Termination::Duration`]: workers loop until a deadline. When it passes, the statistics are
//!    snapshotted and workers stop starting new requests. Requests still in flight are left to
//!    finish, but they no longer count towards the report.
//!
//! Completion is signalled through a [`RunHandle`], which resolves at most once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bang_metrics::{HistogramSnapshot, LatencyHistogram};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::config::ErrorPolicy;
use crate::error::{RunError, TransportError};
use crate::executor::Executor;

/// When a run stops sending requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Every worker sends this many requests.
    Count(u64),
    /// Workers send requests until this much time has passed.
    Duration(Duration),
}

/// The outcome of a completed run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Latency statistics of all successful requests.
    pub snapshot: HistogramSnapshot,
    /// Wall-clock time from start to completion.
    pub elapsed: Duration,
    /// Requests that failed and were skipped under [`ErrorPolicy::Continue`].
    pub failures: u64,
}

/// A set of workers sharing one executor and one histogram.
#[derive(Debug)]
pub struct WorkerPool<E> {
    executor: Arc<E>,
    concurrency: usize,
    termination: Termination,
    on_error: ErrorPolicy,
}

impl<E: Executor> WorkerPool<E> {
    /// Creates a pool of `concurrency` workers which fails on the first transport error.
    pub fn new(executor: E, concurrency: usize, termination: Termination) -> Self {
        Self {
            executor: Arc::new(executor),
            concurrency,
            termination,
            on_error: ErrorPolicy::default(),
        }
    }

    /// Sets how the pool reacts to failed requests.
    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Starts the workers in the background and returns a handle to await completion.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> RunHandle {
        let (done_tx, done_rx) = oneshot::channel();
        let supervisor = tokio::spawn(async move {
            let result = self.supervise().await;
            // The receiver may have gone away, nobody is interested in the result then.
            let _ = done_tx.send(result);
        });

        RunHandle {
            done: done_rx,
            supervisor,
        }
    }

    /// Runs the pool to completion.
    pub async fn run(self) -> Result<RunReport, RunError> {
        self.start().wait().await
    }

    async fn supervise(self) -> Result<RunReport, RunError> {
        let histogram = Arc::new(LatencyHistogram::new());
        let failures = Arc::new(AtomicU64::new(0));
        let stopped = Arc::new(AtomicBool::new(false));
        let start = Instant::now();

        let repetitions = match self.termination {
            Termination::Count(count) => {
                tracing::info!(
                    workers = self.concurrency,
                    requests = count,
                    "sending requests"
                );
                Some(count)
            }
            Termination::Duration(duration) => {
                tracing::info!(workers = self.concurrency, ?duration, "sending requests");
                None
            }
        };

        let mut workers = JoinSet::new();
        for _ in 0..self.concurrency {
            workers.spawn(worker(
                Arc::clone(&self.executor),
                Arc::clone(&histogram),
                Arc::clone(&failures),
                Arc::clone(&stopped),
                self.on_error,
                repetitions,
            ));
        }

        // Returning early drops `workers`, which aborts everything still running.
        match self.termination {
            Termination::Count(_) => {
                while let Some(joined) = workers.join_next().await {
                    joined??;
                }
            }
            Termination::Duration(duration) => {
                let deadline = tokio::time::sleep_until(start + duration);
                tokio::pin!(deadline);

                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        Some(joined) = workers.join_next() => joined??,
                    }
                }
            }
        }

        let snapshot = histogram.snapshot();
        let elapsed = start.elapsed();
        let failures = failures.load(Ordering::Relaxed);
        stopped.store(true, Ordering::Relaxed);
        workers.detach_all();

        if failures > 0 {
            tracing::warn!(failures, "some requests failed and were not recorded");
        }
        tracing::info!(requests = snapshot.count(), ?elapsed, "run completed");

        Ok(RunReport {
            snapshot,
            elapsed,
            failures,
        })
    }
}

/// Sends requests one after another until `repetitions` is reached or the run is stopped.
async fn worker<E: Executor>(
    executor: Arc<E>,
    histogram: Arc<LatencyHistogram>,
    failures: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
    on_error: ErrorPolicy,
    repetitions: Option<u64>,
) -> Result<(), TransportError> {
    let mut sent = 0;
    while repetitions.is_none_or(|limit| sent < limit) && !stopped.load(Ordering::Relaxed) {
        sent += 1;
        match executor.execute().await {
            Ok(latency) => histogram.record(latency),
            Err(error) if on_error == ErrorPolicy::Continue => {
                tracing::debug!(error = &error as &dyn std::error::Error, "request failed");
                failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => return Err(error),
        }
    }

    Ok(())
}

/// Resolves once a run started with [`WorkerPool::start`] has completed.
///
/// Dropping the handle stops the run.
#[derive(Debug)]
pub struct RunHandle {
    done: oneshot::Receiver<Result<RunReport, RunError>>,
    supervisor: JoinHandle<()>,
}

impl RunHandle {
    /// Waits for the run to complete.
    ///
    /// Returns the report of a successful run, or the first error that aborted it.
    pub async fn wait(mut self) -> Result<RunReport, RunError> {
        match (&mut self.done).await {
            Ok(result) => result,
            Err(_) => Err(RunError::Abandoned),
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}
