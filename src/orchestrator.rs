//! The run driver: bounded-concurrency processing of many invoices.
//!
//! ```text
//!  files ─▶ take_while(!cancelled) ─▶ buffer_unordered(concurrency) ─▶ aggregator
//!                                       │
//!                     ┌─────────────────┴──────────────────┐
//!                     │ extract (timeout, retry w/ backoff) │
//!                     │ validate                            │
//!                     │ registry.resolve / assign           │
//!                     │ filename::build                     │
//!                     │ transfer::place                     │
//!                     └─────────────────────────────────────┘
//! ```
//!
//! Every dispatched file yields exactly one [`ProcessingResult`]. Per-file
//! failures are recorded, never propagated: a run only returns `Err` when it
//! cannot start at all.

use crate::aggregate::RunAggregator;
use crate::config::ProcessorConfig;
use crate::error::{ExtractionError, FileError, InvoiceSortError};
use crate::output::{InvoiceFields, InvoiceRecord, Outcome, ProcessingResult, RunMetrics};
use crate::pipeline::extract::InvoiceExtractor;
use crate::pipeline::llm::LlmExtractor;
use crate::pipeline::{filename, input, transfer};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::vendor::VendorRegistry;
use futures::future;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Run-level cancellation flag.
///
/// Cloning shares the flag. Once cancelled, no further file is dispatched;
/// files already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
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

/// Drives the per-file pipeline over a batch of invoices.
pub struct Orchestrator {
    config: ProcessorConfig,
    registry: Arc<VendorRegistry>,
    extractor: Arc<dyn InvoiceExtractor>,
    progress: ProgressCallback,
}

impl Orchestrator {
    pub fn new(
        config: ProcessorConfig,
        registry: Arc<VendorRegistry>,
        extractor: Arc<dyn InvoiceExtractor>,
    ) -> Self {
        Self {
            config,
            registry,
            extractor,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Load the vendor registry from `config.vendors_file` and use the
    /// default [`LlmExtractor`].
    ///
    /// # Errors
    /// Fails when the registry file is unreadable or malformed, or when no
    /// LLM provider can be configured.
    pub fn from_config(config: ProcessorConfig) -> Result<Self, InvoiceSortError> {
        let registry = VendorRegistry::load(&config.vendors_file, config.match_policy.clone())?;
        let extractor = LlmExtractor::from_config(&config)?;
        Ok(Self::new(config, Arc::new(registry), Arc::new(extractor)))
    }

    /// Attach a progress observer.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<VendorRegistry> {
        &self.registry
    }

    /// Discover the PDFs under `input` and process them.
    ///
    /// # Errors
    /// [`InvoiceSortError::InputNotFound`] when `input` does not exist.
    pub async fn run_path(
        &self,
        input: &Path,
        cancel: &CancelToken,
    ) -> Result<RunMetrics, InvoiceSortError> {
        let files = input::discover(input)?;
        Ok(self.run(files, cancel).await)
    }

    /// Process `files` with at most `config.concurrency` in flight.
    ///
    /// Files are dispatched in order and may complete in any order.
    pub async fn run(&self, files: Vec<PathBuf>, cancel: &CancelToken) -> RunMetrics {
        let total = files.len();
        info!(
            "Processing {} files ({} mode, concurrency {})",
            total, self.config.transfer_mode, self.config.concurrency
        );
        self.progress.on_run_start(total);

        let aggregator = RunAggregator::new();
        let dispatched = AtomicUsize::new(0);

        stream::iter(files)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|path| {
                dispatched.fetch_add(1, Ordering::SeqCst);
                self.process_file(path)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .for_each(|result| {
                let snapshot = aggregator.record(result.clone());
                self.progress.on_file_complete(&result, &snapshot);
                future::ready(())
            })
            .await;

        let skipped = total - dispatched.into_inner();
        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!("Run cancelled; {} files not dispatched", skipped);
        }

        let persist_error = match self.registry.flush().await {
            Ok(()) => None,
            Err(e) => {
                warn!("Vendor registry could not be saved: {}", e);
                Some(e.to_string())
            }
        };

        let metrics = aggregator.finalize(skipped, cancelled, persist_error);
        info!(
            "Run complete: {} succeeded, {} failed, {} skipped in {}ms",
            metrics.succeeded, metrics.failed, metrics.skipped, metrics.total_duration_ms
        );
        self.progress.on_run_complete(&metrics);
        metrics
    }

    /// The full pipeline for one file. Never fails; errors become the outcome.
    async fn process_file(&self, path: PathBuf) -> ProcessingResult {
        let start = Instant::now();
        self.progress.on_file_start(&path);
        debug!("Processing {}", path.display());

        let (outcome, attempts) = match self.extract_with_retry(&path).await {
            Ok((fields, attempts)) => (self.file_invoice(&path, fields).await, attempts),
            Err((error, attempts)) => (Outcome::Failed { error }, attempts),
        };

        match &outcome {
            Outcome::Success { destination, .. } => {
                info!("{} → {}", path.display(), destination.display())
            }
            Outcome::Failed { error } => warn!("{} failed: {}", path.display(), error),
        }

        ProcessingResult {
            source_path: path,
            outcome,
            attempts,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Call the extractor under a timeout, retrying transient failures with
    /// exponential backoff: `retry_backoff_ms * 2^(attempt-1)`.
    async fn extract_with_retry(&self, path: &Path) -> Result<(InvoiceFields, u32), (FileError, u32)> {
        let timeout_secs = self.config.extraction_timeout_secs;
        let timeout = Duration::from_secs(timeout_secs);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, self.extractor.extract(path)).await {
                Ok(r) => r,
                Err(_) => Err(ExtractionError::Transient(format!(
                    "extraction timed out after {timeout_secs}s"
                ))),
            };

            match result.and_then(validate) {
                Ok(fields) => return Ok((fields, attempt)),
                Err(ExtractionError::Permanent(detail)) => {
                    return Err((FileError::ExtractionPermanent { detail }, attempt))
                }
                Err(ExtractionError::Transient(detail)) => {
                    if attempt > self.config.max_retries {
                        return Err((
                            FileError::ExtractionTransient {
                                attempts: attempt,
                                detail,
                            },
                            attempt,
                        ));
                    }
                    let backoff = self
                        .config
                        .retry_backoff_ms
                        .saturating_mul(1u64 << (attempt - 1).min(16));
                    warn!(
                        "{}: retry {}/{} after {}ms ({})",
                        path.display(),
                        attempt,
                        self.config.max_retries,
                        backoff,
                        detail
                    );
                    self.progress.on_file_retry(path, attempt, &detail);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }

    /// Resolve the vendor, name the file and put it in place.
    async fn file_invoice(&self, path: &Path, fields: InvoiceFields) -> Outcome {
        let resolution = match &self.config.vendor_override {
            Some(canonical) => self.registry.assign(&fields.vendor, canonical).await,
            None => self.registry.resolve(&fields.vendor).await,
        };
        debug!(
            "Vendor '{}' → '{}' ({:?})",
            fields.vendor, resolution.canonical, resolution.kind
        );

        let record = InvoiceRecord::new(path, fields, resolution.canonical);
        let base = filename::build(&record);

        match transfer::place(path, &self.config.output_dir, &base, self.config.transfer_mode).await {
            Ok(destination) => Outcome::Success {
                destination,
                record,
            },
            Err(error) => Outcome::Failed { error },
        }
    }
}

/// Reject field values that cannot produce a meaningful filename.
fn validate(fields: InvoiceFields) -> Result<InvoiceFields, ExtractionError> {
    if fields.vendor.trim().is_empty() {
        return Err(ExtractionError::Permanent("extracted vendor is empty".into()));
    }
    for (name, value) in [("total_amount", fields.total_amount), ("vat_amount", fields.vat_amount)] {
        if !value.is_finite() || value < 0.0 {
            return Err(ExtractionError::Permanent(format!(
                "extracted {name} {value} is not a non-negative amount"
            )));
        }
    }
    Ok(fields)
}
