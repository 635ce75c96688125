//! Error types for the invoice-sort library.
//!
//! Four error types cover four distinct failure scopes:
//!
//! * [`InvoiceSortError`]: **Fatal**: the run cannot start at all (vendor
//!   registry unreadable, input path missing, provider not configured).
//!   Returned as `Err` from the top-level entry points.
//!
//! * [`FileError`]: **Non-fatal**: a single invoice failed (extraction gave
//!   up, transfer hit an I/O error). Stored inside
//!   [`crate::output::ProcessingResult`] so one bad file never aborts the
//!   batch.
//!
//! * [`ExtractionError`]: what an [`crate::pipeline::extract::InvoiceExtractor`]
//!   returns. The transient/permanent split drives the retry policy.
//!
//! * [`RegistryError`]: vendor storage failures. A load failure is promoted
//!   to [`InvoiceSortError::RegistryLoadFailed`]; a persist failure is logged
//!   and surfaced in [`crate::output::RunMetrics`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the invoice-sort library.
#[derive(Debug, Error)]
pub enum InvoiceSortError {
    // ── Startup errors ────────────────────────────────────────────────────
    /// The vendor registry exists but could not be read or parsed.
    #[error("Failed to load vendor registry '{path}': {detail}\nFix or remove the file and retry.")]
    RegistryLoadFailed { path: PathBuf, detail: String },

    /// Input file or folder was not found.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single invoice file.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// Extraction kept failing with retryable errors until the budget ran out.
    #[error("extraction failed after {attempts} attempts: {detail}")]
    ExtractionTransient { attempts: u32, detail: String },

    /// The document cannot be extracted; retrying would not help.
    #[error("extraction failed: {detail}")]
    ExtractionPermanent { detail: String },

    /// Every candidate destination name was already taken.
    #[error("destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// Copy or move failed; no partial destination was left behind.
    #[error("transfer to '{path}' failed: {detail}")]
    TransferFailed { path: PathBuf, detail: String },
}

impl FileError {
    /// Short machine-friendly label, used in logs and JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FileError::ExtractionTransient { .. } => "extraction_transient",
            FileError::ExtractionPermanent { .. } => "extraction_permanent",
            FileError::DestinationExists { .. } => "destination_exists",
            FileError::TransferFailed { .. } => "transfer_failed",
        }
    }
}

/// Failure reported by an extraction collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// Network hiccup, rate limit, timeout. Worth another attempt.
    #[error("transient: {0}")]
    Transient(String),

    /// Bad or unreadable content. The same input will fail again.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ExtractionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractionError::Transient(_))
    }

    /// The message without the transient/permanent prefix.
    pub fn message(&self) -> &str {
        match self {
            ExtractionError::Transient(m) | ExtractionError::Permanent(m) => m,
        }
    }
}

/// Vendor storage errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot read '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse '{path}': {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("cannot write '{path}': {detail}")]
    Persist { path: PathBuf, detail: String },
}

impl From<RegistryError> for InvoiceSortError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Load { path, source } => InvoiceSortError::RegistryLoadFailed {
                path,
                detail: source.to_string(),
            },
            RegistryError::Parse { path, detail } | RegistryError::Persist { path, detail } => {
                InvoiceSortError::RegistryLoadFailed { path, detail }
            }
        }
    }
}
