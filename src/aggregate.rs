//! Run aggregation: fold per-file results into [`RunMetrics`].

use crate::output::{ProcessingResult, RunMetrics};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Point-in-time counts for progress displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Thread-safe accumulator shared by all workers of one run.
#[derive(Debug)]
pub struct RunAggregator {
    started: Instant,
    metrics: Mutex<RunMetrics>,
}

impl Default for RunAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RunAggregator {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            metrics: Mutex::new(RunMetrics::default()),
        }
    }

    /// Append one result; returns the snapshot including it.
    pub fn record(&self, result: ProcessingResult) -> RunSnapshot {
        let mut m = self.lock();
        m.attempted += 1;
        if result.is_success() {
            m.succeeded += 1;
        } else {
            m.failed += 1;
        }
        m.results.push(result);
        self.snapshot_of(&m)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let m = self.lock();
        self.snapshot_of(&m)
    }

    /// Consume the aggregator and produce the final metrics.
    pub fn finalize(
        self,
        skipped: usize,
        cancelled: bool,
        registry_persist_error: Option<String>,
    ) -> RunMetrics {
        let elapsed = self.started.elapsed().as_millis() as u64;
        let mut metrics = self
            .metrics
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        metrics.skipped = skipped;
        metrics.cancelled = cancelled;
        metrics.total_duration_ms = elapsed;
        metrics.registry_persist_error = registry_persist_error;
        metrics
    }

    fn snapshot_of(&self, m: &RunMetrics) -> RunSnapshot {
        RunSnapshot {
            attempted: m.attempted,
            succeeded: m.succeeded,
            failed: m.failed,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    // A panicking observer must not lose everyone else's results.
    fn lock(&self) -> MutexGuard<'_, RunMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
