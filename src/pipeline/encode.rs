//! Rasterised invoice pages → base64 PNG attachments.
//!
//! PNG keeps small print (VAT lines, invoice numbers) crisp; `detail: "high"`
//! stops vision models from downsampling to a single overview tile.

use crate::error::ExtractionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode every page image for a multimodal request.
pub fn encode_pages(images: &[DynamicImage]) -> Result<Vec<ImageData>, ExtractionError> {
    images
        .iter()
        .enumerate()
        .map(|(i, img)| {
            encode_png(img).map_err(|e| {
                ExtractionError::Permanent(format!("cannot encode page {}: {e}", i + 1))
            })
        })
        .collect()
}

fn encode_png(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded {}x{} page → {} bytes base64", img.width(), img.height(), b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
