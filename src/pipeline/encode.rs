//! Image encoding: rasterised page → base64 PNG payload.
//!
//! Vision requests carry the page as a base64 data payload inside the JSON
//! body. PNG keeps rendered text crisp; JPEG artefacts on small print make
//! explanations vaguer.

use crate::error::PageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A base64-encoded image ready to attach to a vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Base64 (standard alphabet, padded) image bytes.
    pub data: String,
    /// MIME type of the decoded bytes.
    pub mime_type: String,
}

/// PNG-encode a rendered page.
pub fn encode_png(img: &DynamicImage, page: usize) -> Result<EncodedImage, PageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PageError::RenderFailed {
            page,
            detail: format!("PNG encoding failed: {e}"),
        })?;

    let data = STANDARD.encode(&buf);
    debug!("Page {}: encoded image → {} bytes base64", page, data.len());

    Ok(EncodedImage {
        data,
        mime_type: "image/png".to_string(),
    })
}
