//! Error types for the docquest library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`DocQuestError`]: **Fatal** for one document or one question: the
//!   upload cannot be converted or parsed, no provider is configured, or the
//!   answer call exhausted its retries. Returned as `Err(DocQuestError)` from
//!   [`crate::ingest::Pipeline::ingest`] and [`crate::answer::answer`].
//!
//! * [`PageError`]: **Non-fatal**: a single page failed (extraction glitch,
//!   render failure, summary or explanation exhausted). The assembler turns
//!   it into a placeholder value inside the [`crate::output::PageRecord`] so
//!   the rest of the document is unaffected.
//!
//! * [`CallError`]: one failed request to an external capability. The retry
//!   loop in [`crate::pipeline::retry`] inspects it to decide whether another
//!   attempt is worthwhile.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docquest library.
#[derive(Debug, Error)]
pub enum DocQuestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The declared media type is neither PDF nor a supported office format.
    #[error("Unsupported document format '{media_type}' for '{name}'")]
    UnsupportedFormat { name: String, media_type: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// An office document was uploaded but no conversion endpoint is set.
    #[error("'{name}' needs conversion to PDF but no converter endpoint is configured.\nSet DOCQUEST_CONVERTER_URL or --converter-url.")]
    ConverterNotConfigured { name: String },

    /// The conversion service answered with a non-success status.
    #[error("File conversion failed for '{name}' with status code {status}: {message}")]
    ConversionFailed {
        name: String,
        status: u16,
        message: String,
    },

    /// The conversion service could not be reached at all.
    #[error("File conversion request for '{name}' failed: {reason}")]
    ConversionUnavailable { name: String, reason: String },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The bytes are not a PDF (after conversion, if any).
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The question could not be answered after all attempts.
    #[error("Unable to answer the question after {attempts} attempt(s): {detail}")]
    AnswerFailed { attempts: u32, detail: String },

    /// A question was asked before any document was ingested.
    #[error("No documents have been processed yet; add a document before asking questions")]
    NoDocuments,

    // ── Control ───────────────────────────────────────────────────────────
    /// The caller cancelled processing; partial results were discarded.
    #[error("Processing of '{name}' was cancelled")]
    Cancelled { name: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocQuestError {
    /// True when the failure happened while turning the upload into a PDF,
    /// as opposed to parsing the PDF itself.
    pub fn is_conversion_error(&self) -> bool {
        matches!(
            self,
            DocQuestError::UnsupportedFormat { .. }
                | DocQuestError::ConverterNotConfigured { .. }
                | DocQuestError::ConversionFailed { .. }
                | DocQuestError::ConversionUnavailable { .. }
        )
    }

    /// True when the PDF bytes could not be opened.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            DocQuestError::NotAPdf { .. }
                | DocQuestError::CorruptPdf { .. }
                | DocQuestError::PasswordRequired { .. }
                | DocQuestError::WrongPassword { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Never escapes the assembler: it is logged, reported through the progress
/// callback, and replaced by a placeholder value in the page record.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Text or layout could not be read for this page.
    #[error("Page {page}: extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Summarisation call failed after retries.
    #[error("Page {page}: summarisation failed after {attempts} attempt(s): {detail}")]
    SummaryFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// Image explanation call failed after retries.
    #[error("Page {page}: image explanation failed after {attempts} attempt(s): {detail}")]
    ExplanationFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The page container itself became unusable; remaining pages of the
    /// batch cannot be read either.
    #[error("Page {page}: document source unavailable: {detail}")]
    SourceUnavailable { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::ExtractionFailed { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::SummaryFailed { page, .. }
            | PageError::ExplanationFailed { page, .. }
            | PageError::SourceUnavailable { page, .. } => *page,
        }
    }
}

/// One failed request to an external capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The per-call timeout elapsed.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection or protocol failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("status {code}: {message}")]
    Status { code: u16, message: String },
}

impl CallError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, transport failures, 408, 429 and 5xx are transient; any
    /// other status (bad request, auth, not found) will fail the same way.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Timeout { .. } | CallError::Transport(_) => true,
            CallError::Status { code, .. } => matches!(code, 408 | 429 | 500..=599),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failed_display() {
        let e = DocQuestError::ConversionFailed {
            name: "deck.pptx".into(),
            status: 502,
            message: "bad gateway".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("502"), "got: {msg}");
        assert!(msg.contains("deck.pptx"));
        assert!(e.is_conversion_error());
        assert!(!e.is_parse_error());
    }

    #[test]
    fn parse_errors_are_distinct_from_conversion_errors() {
        let e = DocQuestError::CorruptPdf {
            name: "a.pdf".into(),
            detail: "xref".into(),
        };
        assert!(e.is_parse_error());
        assert!(!e.is_conversion_error());
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::SummaryFailed {
            page: 7,
            attempts: 3,
            detail: "timeout".into(),
        };
        assert_eq!(e.page(), 7);
        assert!(e.to_string().contains("Page 7"));
    }

    #[test]
    fn call_error_retry_classification() {
        assert!(CallError::Timeout { secs: 10 }.is_retryable());
        assert!(CallError::Transport("reset".into()).is_retryable());
        assert!(CallError::Status { code: 429, message: String::new() }.is_retryable());
        assert!(CallError::Status { code: 503, message: String::new() }.is_retryable());
        assert!(!CallError::Status { code: 401, message: String::new() }.is_retryable());
        assert!(!CallError::Status { code: 400, message: String::new() }.is_retryable());
    }
}
