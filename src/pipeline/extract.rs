//! The extraction seam: anything that can read invoice fields from a PDF.

use crate::error::ExtractionError;
use crate::output::InvoiceFields;
use async_trait::async_trait;
use std::path::Path;

/// Reads structured invoice fields from a document.
///
/// Implementations are shared between concurrent workers. Return
/// [`ExtractionError::Transient`] for failures that may succeed on retry
/// (timeouts, rate limits, dropped connections) and
/// [`ExtractionError::Permanent`] for everything else; only transient errors
/// are retried.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<InvoiceFields, ExtractionError>;
}
