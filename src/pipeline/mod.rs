//! Pipeline stages for document ingestion.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets the page-access and language-model
//! backends be swapped without touching the orchestration.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ office ──▶ render ──▶ batch ─┬─▶ classify
//! (bytes)   (→ PDF)    (pdfium)  (pool)  ├─▶ summarize ──▶ llm
//!                                        └─▶ encode ──▶ explain ──▶ llm
//! ```
//!
//! 1. [`input`] : resolve a path, URL or buffer to an upload with a media type
//! 2. [`office`]: convert office formats to PDF through the conversion service
//! 3. [`render`]: parse the PDF with pdfium into a [`source::PageSource`]
//! 4. [`batch`] : partition pages and assemble each batch's records in order
//! 5. [`classify`]: text-coverage heuristic for image/graphic-dominant pages
//! 6. [`summarize`] / [`explain`]: the two per-page model calls
//! 7. [`retry`]: timeout and exponential backoff around every model call
//! 8. [`postprocess`]: whitespace normalisation and completion cleanup

pub mod batch;
pub mod classify;
pub mod encode;
pub mod explain;
pub mod input;
pub mod llm;
pub mod office;
pub mod postprocess;
pub mod render;
pub mod retry;
pub mod source;
pub mod summarize;
