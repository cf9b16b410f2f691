//! Progress-callback trait for per-batch and per-page ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events while a document is processed. The trait is `Send + Sync` because
//! batches run as separate tokio tasks and report concurrently.
//!
//! # Example
//!
//! ```rust
//! use docquest::{IngestProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _document: &str, _page: usize, _total: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { pages: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Batch and page events for different batches may arrive concurrently and
/// in any order. Page events within one batch arrive in ascending order.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once the PDF is open and the batch plan is known.
    fn on_document_start(&self, document: &str, total_pages: usize, batches: usize) {
        let _ = (document, total_pages, batches);
    }

    /// Called when a batch task acquires a worker.
    ///
    /// `first_page` and `last_page` are 1-indexed and inclusive.
    fn on_batch_start(&self, document: &str, batch: usize, first_page: usize, last_page: usize) {
        let _ = (document, batch, first_page, last_page);
    }

    /// Called after a page record has been built (placeholders included).
    fn on_page_complete(&self, document: &str, page: usize, total_pages: usize) {
        let _ = (document, page, total_pages);
    }

    /// Called for every non-fatal page error.
    fn on_page_error(&self, document: &str, page: usize, error: &str) {
        let _ = (document, page, error);
    }

    /// Called when a batch task has returned its records.
    fn on_batch_complete(&self, document: &str, batch: usize) {
        let _ = (document, batch);
    }

    /// Called once after merge.
    ///
    /// `degraded_pages` counts pages carrying at least one sentinel value.
    fn on_document_complete(&self, document: &str, total_pages: usize, degraded_pages: usize) {
        let _ = (document, total_pages, degraded_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        batches: AtomicUsize,
        pages: AtomicUsize,
        errors: AtomicUsize,
        degraded: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_batch_start(&self, _d: &str, _b: usize, _f: usize, _l: usize) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _d: &str, _p: usize, _t: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _d: &str, _p: usize, _e: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _d: &str, _t: usize, degraded: usize) {
            self.degraded.store(degraded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start("a.pdf", 12, 3);
        cb.on_batch_start("a.pdf", 0, 1, 5);
        cb.on_page_complete("a.pdf", 1, 12);
        cb.on_page_error("a.pdf", 2, "timeout");
        cb.on_batch_complete("a.pdf", 0);
        cb.on_document_complete("a.pdf", 12, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start("a.pdf", 0, 1, 2);
        tracker.on_page_complete("a.pdf", 1, 2);
        tracker.on_page_error("a.pdf", 2, "boom");
        tracker.on_page_complete("a.pdf", 2, 2);
        tracker.on_document_complete("a.pdf", 2, 1);

        assert_eq!(tracker.batches.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.degraded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn IngestProgressCallback>();
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_document_start("x", 1, 1);
    }
}
