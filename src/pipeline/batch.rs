//! Batch planning and the per-batch page assembler.
//!
//! ## Why batches?
//!
//! Summaries are context-chained: page *n* is summarised with page *n − 1*'s
//! summary as continuity context, so pages inside one chain must run in
//! order. Splitting the document into contiguous batches lets independent
//! chains run in parallel on the worker pool while keeping each chain short.
//! The price is that every batch starts with an empty previous summary.
//!
//! ## Per-page flow
//!
//! ```text
//! layout ──▶ classify ──▶ normalise ──▶ summarise ──▶ [rasterise ──▶ encode ──▶ explain]
//!                                      (chained)      (image-dominant pages only)
//! ```
//!
//! Every failure below the batch level is turned into a sentinel or
//! placeholder value here; nothing page-scoped escapes a batch.

use crate::error::{DocQuestError, PageError};
use crate::output::{ImageAnalysis, PageRecord};
use crate::pipeline::classify::classify;
use crate::pipeline::encode::{encode_png, EncodedImage};
use crate::pipeline::explain::ImageExplainer;
use crate::pipeline::postprocess::normalize_page_text;
use crate::pipeline::source::PageSource;
use crate::pipeline::summarize::Summarizer;
use crate::progress::ProgressCallback;
use crate::prompts;
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Split `total` pages into contiguous 0-based ranges of at most
/// `batch_size` pages. The last range may be shorter.
pub fn partition(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..total)
        .step_by(size)
        .map(|start| start..(start + size).min(total))
        .collect()
}

/// Result of assembling one page.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub record: PageRecord,
    /// Classified image/graphic-dominant.
    pub image_dominant: bool,
    /// The page could not be processed and `record` is a placeholder.
    pub placeholder: bool,
    /// Non-fatal errors hit while building the record.
    pub errors: Vec<PageError>,
}

impl PageOutcome {
    pub(crate) fn placeholder(page_number: usize, errors: Vec<PageError>) -> Self {
        Self {
            record: PageRecord::placeholder(page_number),
            image_dominant: false,
            placeholder: true,
            errors,
        }
    }
}

/// Everything a batch task needs; cloned into each task.
#[derive(Clone)]
pub struct BatchContext {
    pub document: Arc<str>,
    pub source: Arc<dyn PageSource>,
    pub summarizer: Summarizer,
    pub explainer: ImageExplainer,
    pub persona: Arc<str>,
    pub threshold: f64,
    /// When false, summaries are produced by a separate document-wide chain
    /// and records leave the batch with an empty `text_summary`.
    pub summarize_pages: bool,
    pub total_pages: usize,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
}

impl BatchContext {
    fn report_errors(&self, outcome: &PageOutcome) {
        for e in &outcome.errors {
            warn!("{}: {}", self.document, e);
            if let Some(ref cb) = self.progress {
                cb.on_page_error(&self.document, e.page(), &e.to_string());
            }
        }
    }

    fn cancelled(&self) -> DocQuestError {
        DocQuestError::Cancelled {
            name: self.document.to_string(),
        }
    }
}

/// Process the pages of one batch strictly in order.
///
/// Returns one outcome per page in `pages`. Fails only on cancellation,
/// which is checked before every page.
pub async fn run_batch(
    ctx: &BatchContext,
    batch: usize,
    pages: Range<usize>,
) -> Result<Vec<PageOutcome>, DocQuestError> {
    if let Some(ref cb) = ctx.progress {
        cb.on_batch_start(&ctx.document, batch, pages.start + 1, pages.end);
    }
    debug!(
        "{}: batch {} pages {}..={}",
        ctx.document,
        batch,
        pages.start + 1,
        pages.end
    );

    let mut outcomes = Vec::with_capacity(pages.len());
    let mut previous_summary = String::new();
    let mut source_lost: Option<String> = None;

    for index in pages {
        if ctx.cancel.is_cancelled() {
            return Err(ctx.cancelled());
        }
        let page_number = index + 1;

        let outcome = match source_lost {
            Some(ref detail) => PageOutcome::placeholder(
                page_number,
                vec![PageError::SourceUnavailable {
                    page: page_number,
                    detail: detail.clone(),
                }],
            ),
            None => process_page(ctx, index, &previous_summary).await,
        };

        if let Some(PageError::SourceUnavailable { detail, .. }) = outcome
            .errors
            .iter()
            .find(|e| matches!(e, PageError::SourceUnavailable { .. }))
        {
            source_lost.get_or_insert_with(|| detail.clone());
        }

        previous_summary = if outcome.placeholder {
            String::new()
        } else {
            outcome.record.text_summary.clone()
        };

        ctx.report_errors(&outcome);
        if let Some(ref cb) = ctx.progress {
            cb.on_page_complete(&ctx.document, page_number, ctx.total_pages);
        }
        outcomes.push(outcome);
    }

    if let Some(ref cb) = ctx.progress {
        cb.on_batch_complete(&ctx.document, batch);
    }
    Ok(outcomes)
}

async fn process_page(ctx: &BatchContext, index: usize, previous_summary: &str) -> PageOutcome {
    let page_number = index + 1;

    let layout = match ctx.source.layout(index) {
        Ok(layout) => layout,
        Err(e) => return PageOutcome::placeholder(page_number, vec![e]),
    };

    let classification = classify(&layout, ctx.threshold);
    debug!(
        "Page {}: coverage {:.3}, image-dominant: {}",
        page_number, classification.text_coverage, classification.image_dominant
    );

    let text = normalize_page_text(&layout.text);
    let mut errors = Vec::new();

    let text_summary = if !ctx.summarize_pages {
        String::new()
    } else if text.is_empty() {
        prompts::EMPTY_PAGE_SUMMARY.to_string()
    } else {
        match ctx
            .summarizer
            .summarize(&text, previous_summary, page_number, &ctx.persona)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                errors.push(e);
                prompts::summary_failed(page_number)
            }
        }
    };

    let mut image_analysis = Vec::new();
    if classification.image_dominant {
        match rasterize(ctx, index).await {
            Ok(image) => {
                let explanation = match ctx.explainer.explain(&image, page_number).await {
                    Ok(text) => text,
                    Err(e) => {
                        errors.push(e);
                        prompts::EXPLANATION_FAILED.to_string()
                    }
                };
                image_analysis.push(ImageAnalysis {
                    page_number,
                    explanation,
                });
            }
            // Document handle lost; the rest of the batch degrades as well.
            Err(e @ PageError::SourceUnavailable { .. }) => {
                errors.push(e);
                let mut outcome = PageOutcome::placeholder(page_number, errors);
                outcome.image_dominant = true;
                return outcome;
            }
            // Text and summary stay; image analysis is left empty.
            Err(e) => errors.push(e),
        }
    }

    PageOutcome {
        record: PageRecord {
            page_number,
            full_text: layout.text.trim().to_string(),
            text_summary,
            image_analysis,
        },
        image_dominant: classification.image_dominant,
        placeholder: false,
        errors,
    }
}

/// Render and encode off the async runtime.
async fn rasterize(
    ctx: &BatchContext,
    index: usize,
) -> Result<EncodedImage, PageError> {
    let page_number = index + 1;
    let source = Arc::clone(&ctx.source);
    tokio::task::spawn_blocking(move || {
        let img = source.rasterize(index)?;
        encode_png(&img, page_number)
    })
    .await
    .map_err(|e| PageError::RenderFailed {
        page: page_number,
        detail: format!("render task panicked: {e}"),
    })?
}

/// One sequential summary chain over every page of the document.
///
/// Returns `(page_number, summary, error)` for each page in order. Pages
/// whose layout cannot be read are skipped; they become placeholders in the
/// batch pass.
pub async fn run_summary_chain(
    ctx: &BatchContext,
) -> Result<Vec<(usize, String, Option<PageError>)>, DocQuestError> {
    let mut summaries = Vec::with_capacity(ctx.total_pages);
    let mut previous_summary = String::new();

    for index in 0..ctx.total_pages {
        if ctx.cancel.is_cancelled() {
            return Err(ctx.cancelled());
        }
        let page_number = index + 1;
        let Ok(layout) = ctx.source.layout(index) else {
            previous_summary.clear();
            continue;
        };

        let text = normalize_page_text(&layout.text);
        let (summary, error) = if text.is_empty() {
            (prompts::EMPTY_PAGE_SUMMARY.to_string(), None)
        } else {
            match ctx
                .summarizer
                .summarize(&text, &previous_summary, page_number, &ctx.persona)
                .await
            {
                Ok(summary) => (summary, None),
                Err(e) => (prompts::summary_failed(page_number), Some(e)),
            }
        };

        previous_summary = summary.clone();
        summaries.push((page_number, summary, error));
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_twelve_by_five() {
        assert_eq!(partition(12, 5), vec![0..5, 5..10, 10..12]);
    }

    #[test]
    fn partition_edge_cases() {
        assert!(partition(0, 5).is_empty());
        assert_eq!(partition(3, 5), vec![0..3]);
        assert_eq!(partition(5, 5), vec![0..5]);
        assert_eq!(partition(3, 1), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn partition_covers_every_page_once() {
        for total in 0..40 {
            for size in 1..8 {
                let pages: Vec<usize> = partition(total, size).into_iter().flatten().collect();
                assert_eq!(pages, (0..total).collect::<Vec<_>>());
            }
        }
    }
}
