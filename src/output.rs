//! Output types: extracted fields, resolved records, per-file results and
//! run metrics.
//!
//! Everything here is plain data with `Serialize` so the CLI can print it as
//! JSON and observers can forward it without conversion.

use crate::error::FileError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fields returned by an extraction collaborator for one invoice.
///
/// `vendor` is verbatim, exactly as printed on the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFields {
    pub vendor: String,
    pub invoice_date: NaiveDate,
    pub item_count: u32,
    pub category: String,
    pub total_amount: f64,
    pub vat_amount: f64,
}

/// An invoice after its vendor has been resolved. Input to the filename
/// builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub source_path: PathBuf,
    pub vendor_raw: String,
    pub vendor_canonical: String,
    pub invoice_date: NaiveDate,
    pub item_count: u32,
    pub category: String,
    pub total_amount: f64,
    pub vat_amount: f64,
}

impl InvoiceRecord {
    pub fn new(source_path: impl Into<PathBuf>, fields: InvoiceFields, canonical: String) -> Self {
        Self {
            source_path: source_path.into(),
            vendor_raw: fields.vendor,
            vendor_canonical: canonical,
            invoice_date: fields.invoice_date,
            item_count: fields.item_count,
            category: fields.category,
            total_amount: fields.total_amount,
            vat_amount: fields.vat_amount,
        }
    }
}

/// How a file's pipeline ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        destination: PathBuf,
        record: InvoiceRecord,
    },
    Failed {
        error: FileError,
    },
}

/// Result for a single dispatched file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub source_path: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Extraction attempts made, including the first.
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ProcessingResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Destination path; `Some` iff the file succeeded.
    pub fn destination(&self) -> Option<&Path> {
        match &self.outcome {
            Outcome::Success { destination, .. } => Some(destination),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&FileError> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failed { error } => Some(error),
        }
    }
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Files that were dispatched (`succeeded + failed`).
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Files never dispatched because the run was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
    pub total_duration_ms: u64,
    /// Per-file results in completion order.
    pub results: Vec<ProcessingResult>,
    /// Set when the vendor registry could not be saved by the end of the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_persist_error: Option<String>,
}

impl RunMetrics {
    pub fn failures(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}
