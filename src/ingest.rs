//! Document ingestion: the [`Pipeline`] that owns the worker pool.
//!
//! ## Why one pool per `Pipeline`, not per document?
//!
//! The pool bounds how many batches talk to the language model at once.
//! Creating it once and sharing it across every document keeps that bound
//! global: ingesting three documents concurrently still runs at most
//! `concurrency` batches. The pool lives exactly as long as the `Pipeline`
//! and [`Pipeline::shutdown`] closes it.
//!
//! ## Ordering
//!
//! Batches finish in arbitrary order. Results are merged and sorted by page
//! number before a [`DocumentRecord`] is returned, so the record never
//! depends on scheduling.

use crate::config::{ChainScope, PipelineConfig};
use crate::error::{DocQuestError, PageError};
use crate::output::{DocumentRecord, IngestStats, IngestedDocument};
use crate::pipeline::batch::{self, BatchContext, PageOutcome};
use crate::pipeline::explain::ImageExplainer;
use crate::pipeline::input::{check_pdf_magic, UploadedDocument};
use crate::pipeline::llm::{LanguageModel, ProviderModel};
use crate::pipeline::office::{DocumentConverter, HttpConverter};
use crate::pipeline::render::PdfiumSource;
use crate::pipeline::source::{document_text, PageSource};
use crate::pipeline::summarize::{infer_persona, Summarizer};
use crate::prompts;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Ingestion pipeline: conversion, parsing, persona and batched processing.
///
/// Cheap to clone; clones share the worker pool.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    model: Arc<dyn LanguageModel>,
    converter: Option<Arc<dyn DocumentConverter>>,
    workers: Arc<Semaphore>,
}

impl Pipeline {
    /// Build a pipeline whose language model is resolved from the config
    /// (see [`crate::pipeline::llm::resolve_provider`]).
    pub fn new(config: PipelineConfig) -> Result<Self, DocQuestError> {
        let model = ProviderModel::from_config(&config)?;
        Self::with_model(config, Arc::new(model))
    }

    /// Build a pipeline around an explicit language model.
    pub fn with_model(
        config: PipelineConfig,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, DocQuestError> {
        let converter: Option<Arc<dyn DocumentConverter>> = match config.converter_url {
            Some(ref url) => Some(Arc::new(HttpConverter::new(
                url.clone(),
                config.conversion_timeout_secs,
            )?)),
            None => None,
        };
        let workers = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Ok(Self {
            config: Arc::new(config),
            model,
            converter,
            workers,
        })
    }

    /// Replace the office-to-PDF converter.
    pub fn with_converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The language model shared by ingestion and question answering.
    pub fn model(&self) -> Arc<dyn LanguageModel> {
        Arc::clone(&self.model)
    }

    /// Close the worker pool. Batches already running finish; no new batch
    /// can start, so later ingestions fail with an internal error.
    pub fn shutdown(&self) {
        self.workers.close();
        info!("Worker pool closed");
    }

    /// Ingest one upload end to end.
    pub async fn ingest(&self, upload: UploadedDocument) -> Result<IngestedDocument, DocQuestError> {
        self.ingest_with_cancel(upload, &CancellationToken::new())
            .await
    }

    /// Ingest one upload, stopping early once `cancel` fires.
    ///
    /// # Errors
    /// Conversion and parse failures are fatal for this document only.
    /// Page-level failures never surface here; they become sentinel values
    /// inside the returned record.
    pub async fn ingest_with_cancel(
        &self,
        upload: UploadedDocument,
        cancel: &CancellationToken,
    ) -> Result<IngestedDocument, DocQuestError> {
        let prepare_start = Instant::now();
        let name = upload.name.clone();
        info!(document = %name, media_type = %upload.media_type, "Starting ingestion");

        // ── Step 1: Convert to PDF ───────────────────────────────────────
        let pdf_bytes = self.to_pdf(upload).await?;
        check_pdf_magic(&name, &pdf_bytes)?;

        // ── Step 2: Parse ────────────────────────────────────────────────
        let source = PdfiumSource::open(
            name.clone(),
            pdf_bytes,
            self.config.password.clone(),
            self.config.max_rendered_pixels,
        )
        .await?;
        let source: Arc<dyn PageSource> = Arc::new(source);
        let prepare_duration_ms = prepare_start.elapsed().as_millis() as u64;

        let mut ingested = self.ingest_source(&name, source, cancel).await?;
        ingested.stats.prepare_duration_ms = prepare_duration_ms;
        Ok(ingested)
    }

    /// Persona inference plus batched processing over an already-parsed
    /// document.
    pub async fn ingest_source(
        &self,
        name: &str,
        source: Arc<dyn PageSource>,
        cancel: &CancellationToken,
    ) -> Result<IngestedDocument, DocQuestError> {
        if cancel.is_cancelled() {
            return Err(DocQuestError::Cancelled {
                name: name.to_string(),
            });
        }

        let persona = self.persona_for(source.as_ref()).await;
        let (record, stats) = self.process(name, source, &persona, cancel).await?;

        Ok(IngestedDocument {
            record,
            persona,
            stats,
        })
    }

    /// Resolve an upload to PDF bytes, converting office formats.
    pub async fn to_pdf(&self, upload: UploadedDocument) -> Result<Vec<u8>, DocQuestError> {
        if upload.is_pdf() {
            return Ok(upload.bytes);
        }
        if !upload.is_office() {
            return Err(DocQuestError::UnsupportedFormat {
                name: upload.name,
                media_type: upload.media_type,
            });
        }
        match self.converter {
            Some(ref converter) => converter.convert(&upload).await,
            None => Err(DocQuestError::ConverterNotConfigured { name: upload.name }),
        }
    }

    async fn persona_for(&self, source: &dyn PageSource) -> String {
        if !self.config.infer_persona || source.page_count() == 0 {
            return prompts::DEFAULT_PERSONA.to_string();
        }
        let text = document_text(source);
        infer_persona(
            self.model.as_ref(),
            &self.config.retry_policy(),
            &text,
            self.config.persona_sample_chars,
        )
        .await
    }

    /// Run the batch fan-out over an already-parsed document.
    ///
    /// Spawns one task per batch; each waits for a worker permit. With
    /// [`ChainScope::Document`] a single summary chain runs alongside the
    /// batches and its summaries are merged in by page number.
    pub async fn process(
        &self,
        name: &str,
        source: Arc<dyn PageSource>,
        persona: &str,
        cancel: &CancellationToken,
    ) -> Result<(DocumentRecord, IngestStats), DocQuestError> {
        let process_start = Instant::now();
        let total_pages = source.page_count();
        let ranges = batch::partition(total_pages, self.config.batch_size);
        let progress = self.config.progress_callback.clone();

        info!(
            document = %name,
            pages = total_pages,
            batches = ranges.len(),
            "Processing document"
        );
        if let Some(ref cb) = progress {
            cb.on_document_start(name, total_pages, ranges.len());
        }

        let policy = self.config.retry_policy();
        let ctx = BatchContext {
            document: Arc::from(name),
            source,
            summarizer: Summarizer::new(
                Arc::clone(&self.model),
                policy,
                self.config.summary_max_tokens,
            ),
            explainer: ImageExplainer::new(
                Arc::clone(&self.model),
                policy,
                self.config.vision_temperature,
            ),
            persona: Arc::from(persona),
            threshold: self.config.image_text_threshold,
            summarize_pages: self.config.chain_scope == ChainScope::Batch,
            total_pages,
            progress: progress.clone(),
            cancel: cancel.child_token(),
        };

        let (outcomes, chain) = match self.config.chain_scope {
            ChainScope::Batch => (self.fan_out(&ctx, &ranges).await?, None),
            ChainScope::Document => {
                let (outcomes, chain) =
                    tokio::join!(self.fan_out(&ctx, &ranges), self.summary_chain(&ctx));
                (outcomes?, Some(chain?))
            }
        };

        let mut pages = fill_missing(outcomes, total_pages);
        if let Some(summaries) = chain {
            apply_chain(&ctx, &mut pages, summaries);
        }

        let stats = IngestStats {
            total_pages,
            batches: ranges.len(),
            image_pages: pages.iter().filter(|o| o.image_dominant).count(),
            failed_summaries: count_errors(&pages, |e| {
                matches!(e, PageError::SummaryFailed { .. })
            }),
            failed_explanations: count_errors(&pages, |e| {
                matches!(e, PageError::ExplanationFailed { .. })
            }),
            placeholder_pages: pages.iter().filter(|o| o.placeholder).count(),
            prepare_duration_ms: 0,
            process_duration_ms: process_start.elapsed().as_millis() as u64,
        };

        let degraded = pages.iter().filter(|o| !o.errors.is_empty()).count();
        let record = DocumentRecord::new(name, pages.into_iter().map(|o| o.record).collect());

        info!(
            document = %name,
            pages = total_pages,
            image_pages = stats.image_pages,
            degraded,
            elapsed_ms = stats.process_duration_ms,
            "Document processed"
        );
        if let Some(ref cb) = progress {
            cb.on_document_complete(name, total_pages, degraded);
        }
        Ok((record, stats))
    }

    /// Run the document-scope summary chain on a worker of its own.
    async fn summary_chain(
        &self,
        ctx: &BatchContext,
    ) -> Result<Vec<(usize, String, Option<PageError>)>, DocQuestError> {
        let _permit = self.acquire_worker(ctx).await?;
        debug!("{}: document summary chain started", ctx.document);
        batch::run_summary_chain(ctx).await
    }

    /// Wait for a worker permit, giving up on cancellation or shutdown.
    async fn acquire_worker(
        &self,
        ctx: &BatchContext,
    ) -> Result<OwnedSemaphorePermit, DocQuestError> {
        tokio::select! {
            permit = Arc::clone(&self.workers).acquire_owned() => permit.map_err(|_| {
                DocQuestError::Internal("worker pool is shut down".into())
            }),
            _ = ctx.cancel.cancelled() => Err(DocQuestError::Cancelled {
                name: ctx.document.to_string(),
            }),
        }
    }

    /// Spawn one task per batch and collect every outcome.
    async fn fan_out(
        &self,
        ctx: &BatchContext,
        ranges: &[std::ops::Range<usize>],
    ) -> Result<Vec<PageOutcome>, DocQuestError> {
        let mut tasks = JoinSet::new();
        for (i, range) in ranges.iter().cloned().enumerate() {
            let ctx = ctx.clone();
            let pipeline = self.clone();
            tasks.spawn(async move {
                let _permit = pipeline.acquire_worker(&ctx).await?;
                batch::run_batch(&ctx, i + 1, range).await
            });
        }

        let mut outcomes = Vec::with_capacity(ctx.total_pages);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(batch_outcomes)) => outcomes.extend(batch_outcomes),
                Ok(Err(e)) => {
                    ctx.cancel.cancel();
                    tasks.abort_all();
                    return Err(e);
                }
                Err(join_err) => {
                    // Pages of this batch are filled in as placeholders below.
                    error!("{}: batch task failed: {}", ctx.document, join_err);
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(DocQuestError::Cancelled {
                name: ctx.document.to_string(),
            });
        }
        Ok(outcomes)
    }
}

/// Sort outcomes by page and insert a placeholder for every page that no
/// batch returned.
fn fill_missing(mut outcomes: Vec<PageOutcome>, total_pages: usize) -> Vec<PageOutcome> {
    let present: BTreeSet<usize> = outcomes.iter().map(|o| o.record.page_number).collect();
    for page_number in 1..=total_pages {
        if !present.contains(&page_number) {
            warn!("Page {} missing after merge; inserting placeholder", page_number);
            outcomes.push(PageOutcome::placeholder(
                page_number,
                vec![PageError::SourceUnavailable {
                    page: page_number,
                    detail: "batch task aborted".into(),
                }],
            ));
        }
    }
    outcomes.sort_by_key(|o| o.record.page_number);
    outcomes
}

/// Merge document-scope summaries into non-placeholder records.
fn apply_chain(
    ctx: &BatchContext,
    pages: &mut [PageOutcome],
    summaries: Vec<(usize, String, Option<PageError>)>,
) {
    let mut by_page: BTreeMap<usize, (String, Option<PageError>)> = summaries
        .into_iter()
        .map(|(page, summary, err)| (page, (summary, err)))
        .collect();

    for outcome in pages.iter_mut() {
        if outcome.placeholder {
            continue;
        }
        let page_number = outcome.record.page_number;
        match by_page.remove(&page_number) {
            Some((summary, err)) => {
                outcome.record.text_summary = summary;
                if let Some(e) = err {
                    warn!("{}: {}", ctx.document, e);
                    if let Some(ref cb) = ctx.progress {
                        cb.on_page_error(&ctx.document, page_number, &e.to_string());
                    }
                    outcome.errors.push(e);
                }
            }
            None => {
                debug!("Page {}: no chained summary", page_number);
                outcome.record.text_summary = prompts::summary_failed(page_number);
            }
        }
    }
}

fn count_errors(pages: &[PageOutcome], pred: impl Fn(&PageError) -> bool) -> usize {
    pages
        .iter()
        .flat_map(|o| o.errors.iter())
        .filter(|e| pred(e))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PageRecord;

    fn outcome(page: usize) -> PageOutcome {
        PageOutcome {
            record: PageRecord {
                page_number: page,
                full_text: format!("p{page}"),
                text_summary: format!("s{page}"),
                image_analysis: Vec::new(),
            },
            image_dominant: false,
            placeholder: false,
            errors: Vec::new(),
        }
    }

    #[test]
    fn fill_missing_sorts_and_fills_gaps() {
        let merged = fill_missing(vec![outcome(4), outcome(1), outcome(2)], 5);
        let numbers: Vec<usize> = merged.iter().map(|o| o.record.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(merged[2].placeholder);
        assert!(merged[4].placeholder);
        assert!(!merged[0].placeholder);
        assert_eq!(merged[2].record, PageRecord::placeholder(3));
    }

    #[test]
    fn fill_missing_is_idempotent_on_sorted_input() {
        let once = fill_missing(vec![outcome(2), outcome(1)], 2);
        let twice = fill_missing(once.clone(), 2);
        let a: Vec<_> = once.iter().map(|o| o.record.clone()).collect();
        let b: Vec<_> = twice.iter().map(|o| o.record.clone()).collect();
        assert_eq!(a, b);
    }
}
