//! Pipeline stages for a single invoice.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ (registry) ──▶ filename ──▶ transfer
//! (discover) (LLM)       (vendor)      (name)       (copy/move)
//! ```
//!
//! 1. [`input`]    expands a file-or-folder argument to the PDFs to process
//! 2. [`extract`]  holds the [`extract::InvoiceExtractor`] seam. The default
//!    implementation, [`llm::LlmExtractor`], is built from [`render`]
//!    (pdfium text/raster), [`encode`] (PNG attachments) and [`parse`]
//!    (lenient JSON reply parsing)
//! 3. [`filename`] builds a deterministic destination name from a resolved record
//! 4. [`transfer`] does the atomic, no-clobber copy or move into the output folder
//!
//! Vendor resolution between 2 and 3 lives in [`crate::vendor`].

pub mod encode;
pub mod extract;
pub mod filename;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
pub mod transfer;
