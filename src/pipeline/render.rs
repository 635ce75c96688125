//! Read an invoice with pdfium: its text layer, or page images when the
//! document is a scan.
//!
//! pdfium is a blocking C library, so everything here runs inside
//! `spawn_blocking`. The library itself is located (and on first use
//! downloaded) by `pdfium-auto`.

use crate::error::ExtractionError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fewer non-whitespace chars than this means "no usable text layer".
const MIN_TEXT_CHARS: usize = 20;

/// What the extractor will send to the model.
#[derive(Debug)]
pub enum InvoiceContent {
    /// Concatenated text layer of the first pages.
    Text(String),
    /// Rasterised first pages, for scanned documents.
    Images(Vec<DynamicImage>),
}

/// Load the first `max_pages` pages of `path`.
///
/// Text is preferred; pages are only rasterised (longest edge capped at
/// `max_pixels`) when the text layer is empty or nearly so.
pub async fn load_invoice(
    path: &Path,
    max_pages: usize,
    max_pixels: u32,
) -> Result<InvoiceContent, ExtractionError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_blocking(&path, max_pages, max_pixels))
        .await
        .map_err(|e| ExtractionError::Permanent(format!("PDF task panicked: {e}")))?
}

fn load_blocking(
    path: &Path,
    max_pages: usize,
    max_pixels: u32,
) -> Result<InvoiceContent, ExtractionError> {
    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| ExtractionError::Permanent(format!("PDF engine unavailable: {e}")))?;

    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ExtractionError::Permanent(format!("cannot open PDF: {e:?}")))?;

    let pages = document.pages();
    let count = (pages.len() as usize).min(max_pages.max(1));
    if count == 0 {
        return Err(ExtractionError::Permanent("PDF has no pages".into()));
    }

    let mut text = String::new();
    for idx in 0..count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ExtractionError::Permanent(format!("page {}: {e:?}", idx + 1)))?;
        match page.text() {
            Ok(t) => {
                text.push_str(&t.all());
                text.push('\n');
            }
            Err(e) => warn!("{}: no text on page {}: {:?}", path.display(), idx + 1, e),
        };
    }

    let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
    if meaningful >= MIN_TEXT_CHARS {
        debug!(
            "{}: {} chars of text from {} pages",
            path.display(),
            text.len(),
            count
        );
        return Ok(InvoiceContent::Text(text));
    }

    debug!("{}: no text layer, rasterising {} pages", path.display(), count);
    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(count);
    for idx in 0..count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ExtractionError::Permanent(format!("page {}: {e:?}", idx + 1)))?;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ExtractionError::Permanent(format!("cannot render page {}: {e:?}", idx + 1))
        })?;
        images.push(bitmap.as_image());
    }
    Ok(InvoiceContent::Images(images))
}
