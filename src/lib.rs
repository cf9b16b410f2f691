//! # docquest
//!
//! Ingest PDF and office documents into a page-ordered knowledge record and
//! answer questions about them with a language model.
//!
//! ## Why this crate?
//!
//! Plain text extraction loses everything a page shows rather than says:
//! charts, diagrams, scanned figures. Sending every page to a vision model is
//! slow and expensive. This crate classifies each page by how much of it is
//! covered by text, summarises every page with the previous page's summary as
//! context, and sends only image/graphic-dominant pages to the vision model.
//! The resulting [`DocumentRecord`] is then the knowledge base for
//! conversational question answering.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Input     local path, URL or bytes + media type
//!  ├─ 2. Convert   office formats → PDF via the conversion service
//!  ├─ 3. Parse     page text, text blocks, images, drawings (pdfium)
//!  ├─ 4. Persona   one call deriving the summarisation system instruction
//!  ├─ 5. Batches   bounded worker pool, one task per batch of pages
//!  │     ├─ classify    text coverage vs. threshold
//!  │     ├─ summarise   chained on the previous page's summary
//!  │     └─ explain     rasterise + vision call for image-dominant pages
//!  └─ 6. Merge     sort by page number → DocumentRecord
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docquest::{Pipeline, PipelineConfig, Session, UploadedDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::default();
//!     let pipeline = Pipeline::new(config.clone())?;
//!
//!     let upload = UploadedDocument::from_path("report.pdf").await?;
//!     let ingested = pipeline.ingest(upload).await?;
//!     eprintln!("{} pages, {} image pages",
//!         ingested.stats.total_pages, ingested.stats.image_pages);
//!
//!     let mut session = Session::new(pipeline.model(), &config);
//!     session.add_document(ingested.record);
//!     println!("{}", session.ask("What are the key findings?").await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docquest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docquest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod answer;
pub mod config;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use answer::{answer, compose_context, format_history};
pub use config::{ChainScope, PipelineConfig, PipelineConfigBuilder};
pub use error::{CallError, DocQuestError, PageError};
pub use ingest::Pipeline;
pub use output::{
    ChatTurn, DocumentRecord, ImageAnalysis, IngestStats, IngestedDocument, PageRecord,
};
pub use pipeline::input::UploadedDocument;
pub use pipeline::llm::{LanguageModel, ModelRequest, ProviderModel, RequestKind};
pub use pipeline::office::{DocumentConverter, HttpConverter};
pub use pipeline::retry::RetryPolicy;
pub use pipeline::source::{BlockRect, PageLayout, PageSource, StaticSource};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::Session;
pub use tokio_util::sync::CancellationToken;
