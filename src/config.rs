//! Configuration for document ingestion and question answering.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The config is constructed once at process
//! start and handed to [`crate::ingest::Pipeline::new`]; nothing reads
//! endpoints, credentials or model names from ambient global state after
//! that point.

use crate::error::DocQuestError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`crate::ingest::Pipeline`].
///
/// # Example
/// ```rust
/// use docquest::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .batch_size(5)
///     .concurrency(4)
///     .image_text_threshold(0.25)
///     .build()
///     .unwrap();
/// assert_eq!(config.batch_size, 5);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Pages per batch. Default: 5.
    ///
    /// A batch is the unit of concurrent work. Pages inside a batch run
    /// sequentially so each summary can see the previous one; smaller
    /// batches mean more parallelism and shorter context chains.
    pub batch_size: usize,

    /// Worker-pool size: how many batches may run at once. Default: 4.
    pub concurrency: usize,

    /// Text-coverage threshold below which a page with images or drawings
    /// is image-dominant. Default: 0.4.
    ///
    /// Coverage is the summed text-block area over the page area. For PDFs,
    /// blocks are pdfium text-object bounds merged into paragraph-like
    /// regions (see [`crate::pipeline::source::merge_text_blocks`]), so the
    /// value tracks what block-level extractors report. Values between 0.1
    /// and 0.4 have all been used in practice; lower values send fewer pages
    /// to the vision model.
    pub image_text_threshold: f64,

    /// Scope of the summary context chain. Default: [`ChainScope::Batch`].
    pub chain_scope: ChainScope,

    /// Infer a per-document persona used as the summarisation system
    /// instruction. Default: true.
    pub infer_persona: bool,

    /// Maximum characters of document text sent for persona inference. Default: 12 000.
    pub persona_sample_chars: usize,

    /// Attempts per external call before falling back. Default: 3.
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds. Default: 2000.
    ///
    /// Doubles after each further failure: 2 s → 4 s → 8 s.
    pub initial_backoff_ms: u64,

    /// Per-call timeout for language-model requests, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Max tokens for a page summary. Default: 1024.
    pub summary_max_tokens: usize,

    /// Max tokens for an answer. Default: 4096.
    pub answer_max_tokens: usize,

    /// Sampling temperature for image explanations. Default: 0.0.
    ///
    /// Summaries and answers are always requested at temperature 0.
    pub vision_temperature: f32,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "azure", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Endpoint of the office-to-PDF conversion service.
    pub converter_url: Option<String>,

    /// Timeout for one conversion request, in seconds. Default: 120.
    pub conversion_timeout_secs: u64,

    /// Download timeout for URL inputs, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Longest edge of a rasterised page, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            concurrency: 4,
            image_text_threshold: 0.4,
            chain_scope: ChainScope::default(),
            infer_persona: true,
            persona_sample_chars: 12_000,
            max_attempts: 3,
            initial_backoff_ms: 2000,
            api_timeout_secs: 60,
            summary_max_tokens: 1024,
            answer_max_tokens: 4096,
            vision_temperature: 0.0,
            model: None,
            provider_name: None,
            provider: None,
            converter_url: None,
            conversion_timeout_secs: 120,
            download_timeout_secs: 120,
            max_rendered_pixels: 2000,
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("image_text_threshold", &self.image_text_threshold)
            .field("chain_scope", &self.chain_scope)
            .field("infer_persona", &self.infer_persona)
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("converter_url", &self.converter_url)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Retry policy shared by every external call.
    pub fn retry_policy(&self) -> crate::pipeline::retry::RetryPolicy {
        crate::pipeline::retry::RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            call_timeout: Duration::from_secs(self.api_timeout_secs),
        }
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl fmt::Debug for PipelineConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl PipelineConfigBuilder {
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn image_text_threshold(mut self, t: f64) -> Self {
        self.config.image_text_threshold = t;
        self
    }

    pub fn chain_scope(mut self, scope: ChainScope) -> Self {
        self.config.chain_scope = scope;
        self
    }

    pub fn infer_persona(mut self, v: bool) -> Self {
        self.config.infer_persona = v;
        self
    }

    pub fn persona_sample_chars(mut self, n: usize) -> Self {
        self.config.persona_sample_chars = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.config.initial_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn summary_max_tokens(mut self, n: usize) -> Self {
        self.config.summary_max_tokens = n;
        self
    }

    pub fn answer_max_tokens(mut self, n: usize) -> Self {
        self.config.answer_max_tokens = n;
        self
    }

    pub fn vision_temperature(mut self, t: f32) -> Self {
        self.config.vision_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn converter_url(mut self, url: impl Into<String>) -> Self {
        self.config.converter_url = Some(url.into());
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocQuestError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(DocQuestError::InvalidConfig(
                "Batch size must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(DocQuestError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(c.image_text_threshold > 0.0 && c.image_text_threshold <= 1.0) {
            return Err(DocQuestError::InvalidConfig(format!(
                "Image text threshold must be in (0, 1], got {}",
                c.image_text_threshold
            )));
        }
        if c.max_attempts == 0 {
            return Err(DocQuestError::InvalidConfig(
                "Max attempts must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(DocQuestError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How far the summary context chain reaches.
///
/// | Scope | Behaviour |
/// |-------|-----------|
/// | `Batch` | Each batch starts with an empty previous summary. Batches are fully parallel; continuity across batch boundaries is lost. |
/// | `Document` | One sequential summary chain covers the whole document while classification and image explanation still run per batch in parallel. The chain occupies one worker for its whole run and counts against `concurrency` like a batch. |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChainScope {
    /// Chain restarts at every batch boundary (default).
    #[default]
    Batch,
    /// One chain over all pages, decoupled from image explanation.
    Document,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.batch_size, 5);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.initial_backoff_ms, 2000);
        assert_eq!(c.chain_scope, ChainScope::Batch);
        assert!((0.1..=0.4).contains(&c.image_text_threshold));
    }

    #[test]
    fn build_rejects_zero_batch_size() {
        let err = PipelineConfig::builder().batch_size(0).build().unwrap_err();
        assert!(err.to_string().contains("Batch size"));
    }

    #[test]
    fn build_rejects_out_of_range_threshold() {
        assert!(PipelineConfig::builder()
            .image_text_threshold(0.0)
            .build()
            .is_err());
        assert!(PipelineConfig::builder()
            .image_text_threshold(1.5)
            .build()
            .is_err());
        assert!(PipelineConfig::builder()
            .image_text_threshold(0.19)
            .build()
            .is_ok());
    }

    #[test]
    fn retry_policy_reflects_config() {
        let c = PipelineConfig::builder()
            .max_attempts(5)
            .initial_backoff_ms(100)
            .api_timeout_secs(7)
            .build()
            .unwrap();
        let p = c.retry_policy();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.initial_delay, Duration::from_millis(100));
        assert_eq!(p.call_timeout, Duration::from_secs(7));
    }

    #[test]
    fn debug_redacts_password() {
        let c = PipelineConfig::builder().password("hunter2").build().unwrap();
        let s = format!("{c:?}");
        assert!(!s.contains("hunter2"));
    }
}
