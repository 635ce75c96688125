//! # invoice-sort
//!
//! Rename and file PDF invoices by vendor, date and amount, using an LLM to
//! read them and a persistent registry to keep vendor names consistent.
//!
//! Invoices from one supplier arrive under many spellings: "Amazon Business
//! EU S.à.r.l", "AMAZON BUSINESS EU SARL", "Amazon Business". Filing them by
//! the raw string scatters one vendor over many names. The
//! [`VendorRegistry`] maps every spelling it has seen to one canonical name,
//! learning new spellings by similarity as it goes, and persists what it
//! learns in a small YAML file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! folder / file
//!  │
//!  ├─ 1. Discover  direct *.pdf children, sorted
//!  ├─ 2. Extract   LLM reads vendor/date/items/category/total/VAT (timeout + retry)
//!  ├─ 3. Resolve   raw vendor → canonical name via VendorRegistry
//!  ├─ 4. Name      Vendor-YYYYMMDD-items-category-total-vat.pdf
//!  ├─ 5. Transfer  atomic, no-clobber copy or move into the output folder
//!  └─ 6. Report    per-file ProcessingResult + RunMetrics
//! ```
//!
//! Up to `concurrency` invoices run through steps 2–5 at once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_sort::{CancelToken, Orchestrator, ProcessorConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / EDGEQUAKE_LLM_PROVIDER / …
//!     let config = ProcessorConfig::builder()
//!         .output_dir("sorted")
//!         .vendors_file("vendors.yaml")
//!         .build()?;
//!     let orchestrator = Orchestrator::from_config(config)?;
//!     let metrics = orchestrator
//!         .run_path(Path::new("inbox"), &CancelToken::new())
//!         .await?;
//!     eprintln!("{} filed, {} failed", metrics.succeeded, metrics.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Custom extraction
//!
//! Anything implementing [`InvoiceExtractor`] can replace the default
//! [`LlmExtractor`], e.g. a rules engine for a known supplier or a scripted
//! fake in tests. Pass it to [`Orchestrator::new`].
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `invoice-sort` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `bundled` | off     | Embeds the pdfium library in the binary instead of downloading it on first use |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod runlog;
pub mod vendor;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{RunAggregator, RunSnapshot};
pub use config::{MatchPolicy, ProcessorConfig, ProcessorConfigBuilder, TransferMode};
pub use error::{ExtractionError, FileError, InvoiceSortError, RegistryError};
pub use orchestrator::{CancelToken, Orchestrator};
pub use output::{InvoiceFields, InvoiceRecord, Outcome, ProcessingResult, RunMetrics};
pub use pipeline::extract::InvoiceExtractor;
pub use pipeline::llm::LlmExtractor;
pub use progress::{
    ChannelProgressCallback, NoopProgressCallback, ProgressCallback, RunEvent, RunEventStream,
    RunProgressCallback,
};
pub use runlog::RunLogEntry;
pub use vendor::{Resolution, ResolutionKind, VendorEntry, VendorRegistry, UNKNOWN_VENDOR};
