//! pdfium-backed [`PageSource`]: layout extraction and rasterisation.
//!
//! ## Why snapshot layouts up front?
//!
//! `pdfium-render` documents borrow the `Pdfium` binding and are not `Send`,
//! so they cannot be shared across batch tasks. Opening the PDF once inside
//! `spawn_blocking` and copying every page's text, text-block geometry and
//! object inventory into plain [`PageLayout`] values gives the batch tasks a
//! read-only, thread-safe view. Rasterisation is the only operation that
//! needs pdfium again; it reopens the in-memory bytes for the one page that
//! needs rendering, which only happens for image-dominant pages.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly; `max_rendered_pixels` caps the longest edge so a
//! poster-sized page does not produce a huge upload.

use crate::error::{DocQuestError, PageError};
use crate::pipeline::source::{merge_text_blocks, BlockRect, PageLayout, PageSource};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A parsed PDF held in memory.
pub struct PdfiumSource {
    bytes: Arc<Vec<u8>>,
    password: Option<String>,
    max_rendered_pixels: u32,
    layouts: Vec<Result<PageLayout, PageError>>,
}

impl PdfiumSource {
    /// Parse `bytes` and snapshot every page's layout.
    ///
    /// Runs inside `spawn_blocking` since pdfium operations are CPU-bound.
    pub async fn open(
        name: impl Into<String>,
        bytes: Vec<u8>,
        password: Option<String>,
        max_rendered_pixels: u32,
    ) -> Result<Self, DocQuestError> {
        let name = name.into();
        let task_name = name.clone();
        tokio::task::spawn_blocking(move || {
            Self::open_blocking(task_name, bytes, password, max_rendered_pixels)
        })
        .await
        .map_err(|e| DocQuestError::Internal(format!("PDF parse task for '{name}' panicked: {e}")))?
    }

    fn open_blocking(
        name: String,
        bytes: Vec<u8>,
        password: Option<String>,
        max_rendered_pixels: u32,
    ) -> Result<Self, DocQuestError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&bytes, password.as_deref())
            .map_err(|e| map_load_error(&name, password.is_some(), &e))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        info!("PDF '{}' loaded: {} pages", name, total);

        let mut layouts = Vec::with_capacity(total);
        for index in 0..total {
            let layout = match pages.get(index as u16) {
                Ok(page) => extract_layout(index, &page),
                Err(e) => Err(PageError::ExtractionFailed {
                    page: index + 1,
                    detail: format!("{:?}", e),
                }),
            };
            if let Err(ref e) = layout {
                warn!("{}: {}", name, e);
            }
            layouts.push(layout);
        }

        drop(pages);
        drop(document);

        Ok(Self {
            bytes: Arc::new(bytes),
            password,
            max_rendered_pixels,
            layouts,
        })
    }
}

impl PageSource for PdfiumSource {
    fn page_count(&self) -> usize {
        self.layouts.len()
    }

    fn layout(&self, index: usize) -> Result<PageLayout, PageError> {
        match self.layouts.get(index) {
            Some(Ok(layout)) => Ok(layout.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(PageError::ExtractionFailed {
                page: index + 1,
                detail: format!("page index {index} out of range"),
            }),
        }
    }

    fn rasterize(&self, index: usize) -> Result<DynamicImage, PageError> {
        let page_number = index + 1;
        let render_err = |detail: String| PageError::RenderFailed {
            page: page_number,
            detail,
        };

        let pdfium = bind_pdfium().map_err(|e| PageError::SourceUnavailable {
            page: page_number,
            detail: e.to_string(),
        })?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, self.password.as_deref())
            .map_err(|e| PageError::SourceUnavailable {
                page: page_number,
                detail: format!("{:?}", e),
            })?;
        let page = document
            .pages()
            .get(index as u16)
            .map_err(|e| render_err(format!("{:?}", e)))?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_err(format!("{:?}", e)))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Bind to `PDFIUM_LIB_PATH` when set, otherwise to the system library.
fn bind_pdfium() -> Result<Pdfium, DocQuestError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| {
        DocQuestError::Internal(format!(
            "Failed to bind to pdfium library: {:?}\nSet PDFIUM_LIB_PATH=/path/to/libpdfium.",
            e
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(name: &str, password_given: bool, e: &PdfiumError) -> DocQuestError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password_given {
            DocQuestError::WrongPassword {
                name: name.to_string(),
            }
        } else {
            DocQuestError::PasswordRequired {
                name: name.to_string(),
            }
        }
    } else {
        DocQuestError::CorruptPdf {
            name: name.to_string(),
            detail: err_str,
        }
    }
}

/// Copy one page's text, text-object boxes and object inventory.
fn extract_layout(index: usize, page: &PdfPage) -> Result<PageLayout, PageError> {
    let page_number = index + 1;
    let text = page
        .text()
        .map_err(|e| PageError::ExtractionFailed {
            page: page_number,
            detail: format!("{:?}", e),
        })?
        .all();

    let mut text_objects = Vec::new();
    let mut image_count = 0;
    let mut has_drawings = false;

    for object in page.objects().iter() {
        match object.object_type() {
            PdfPageObjectType::Text => {
                if let Ok(quad) = object.bounds() {
                    text_objects.push(BlockRect::new(
                        quad.left().value as f64,
                        quad.top().value as f64,
                        quad.right().value as f64,
                        quad.bottom().value as f64,
                    ));
                }
            }
            PdfPageObjectType::Image => image_count += 1,
            PdfPageObjectType::Path | PdfPageObjectType::Shading => has_drawings = true,
            _ => {}
        }
    }

    Ok(PageLayout {
        index,
        text_blocks: merge_text_blocks(&text_objects),
        width: page.width().value as f64,
        height: page.height().value as f64,
        text,
        image_count,
        has_drawings,
    })
}
