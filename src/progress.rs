//! Progress callbacks for per-file run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::orchestrator::Orchestrator::with_progress`] to observe a run as
//! files are extracted, resolved and transferred. The orchestrator never
//! assumes anything about how events are rendered: the CLI drives a progress
//! bar, a service might forward them to a WebSocket.
//!
//! Callers that prefer a `Stream` over callbacks can use
//! [`ChannelProgressCallback`], which turns every event into a [`RunEvent`].
//!
//! # Example
//!
//! ```rust
//! use invoice_sort::{ProcessingResult, RunProgressCallback, RunSnapshot};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl RunProgressCallback for FailureCounter {
//!     fn on_file_complete(&self, result: &ProcessingResult, _snapshot: &RunSnapshot) {
//!         if !result.is_success() {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::aggregate::RunSnapshot;
use crate::output::{ProcessingResult, RunMetrics};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// Called by the orchestrator as a run progresses.
///
/// Files are processed concurrently, so every method except
/// `on_run_start`/`on_run_complete` may be called from several tasks at
/// once. All methods default to no-ops.
pub trait RunProgressCallback: Send + Sync {
    /// Called once before any file is dispatched.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file is dispatched to a worker.
    fn on_file_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called before a transient extraction failure is retried.
    ///
    /// `attempt` is the 1-indexed attempt that just failed.
    fn on_file_retry(&self, path: &Path, attempt: u32, error: &str) {
        let _ = (path, attempt, error);
    }

    /// Called once per dispatched file with its final result.
    fn on_file_complete(&self, result: &ProcessingResult, snapshot: &RunSnapshot) {
        let _ = (result, snapshot);
    }

    /// Called once after every dispatched file has completed.
    fn on_run_complete(&self, metrics: &RunMetrics) {
        let _ = metrics;
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback type.
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

/// A run event, as emitted by [`ChannelProgressCallback`].
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        total_files: usize,
    },
    FileStarted {
        path: PathBuf,
    },
    FileRetry {
        path: PathBuf,
        attempt: u32,
        error: String,
    },
    FileCompleted {
        result: ProcessingResult,
        snapshot: RunSnapshot,
    },
    RunCompleted {
        metrics: RunMetrics,
    },
}

/// A boxed stream of run events.
pub type RunEventStream = Pin<Box<dyn Stream<Item = RunEvent> + Send>>;

/// Forwards every callback into an unbounded channel.
///
/// The stream ends once the callback (and every clone of the orchestrator
/// holding it) is dropped.
pub struct ChannelProgressCallback {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelProgressCallback {
    pub fn new() -> (Self, RunEventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, Box::pin(UnboundedReceiverStream::new(rx)))
    }

    // Receiver gone means nobody is listening any more.
    fn send(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

impl RunProgressCallback for ChannelProgressCallback {
    fn on_run_start(&self, total_files: usize) {
        self.send(RunEvent::RunStarted { total_files });
    }

    fn on_file_start(&self, path: &Path) {
        self.send(RunEvent::FileStarted {
            path: path.to_path_buf(),
        });
    }

    fn on_file_retry(&self, path: &Path, attempt: u32, error: &str) {
        self.send(RunEvent::FileRetry {
            path: path.to_path_buf(),
            attempt,
            error: error.to_string(),
        });
    }

    fn on_file_complete(&self, result: &ProcessingResult, snapshot: &RunSnapshot) {
        self.send(RunEvent::FileCompleted {
            result: result.clone(),
            snapshot: *snapshot,
        });
    }

    fn on_run_complete(&self, metrics: &RunMetrics) {
        self.send(RunEvent::RunCompleted {
            metrics: metrics.clone(),
        });
    }
}
