//! Language-model seam: request shapes, the [`LanguageModel`] trait, and the
//! adapter over an `edgequake-llm` provider.
//!
//! The pipeline never talks to a provider directly. It builds a
//! [`ModelRequest`] (system instruction, user prompt, optional image,
//! explicit temperature and token budget) and hands it to a
//! `dyn LanguageModel`. Production code uses [`ProviderModel`]; tests plug in
//! scripted fakes.
//!
//! Failures come back as [`CallError`] so the retry loop can tell a
//! transient 503 from a permanent 401.

use crate::config::PipelineConfig;
use crate::error::{CallError, DocQuestError};
use crate::pipeline::encode::EncodedImage;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Model used when the caller names a provider but no model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Which of the call shapes a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Persona,
    Summary,
    ImageExplanation,
    Answer,
}

/// One request to the language capability.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub kind: RequestKind,
    pub system: String,
    pub user: String,
    pub image: Option<EncodedImage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Black-box text/vision completion capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one request and return the generated text.
    async fn complete(&self, request: &ModelRequest) -> Result<String, CallError>;
}

/// [`LanguageModel`] backed by an `edgequake-llm` provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Resolve a provider from the config and wrap it.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, DocQuestError> {
        resolve_provider(config).map(Self::new)
    }
}

#[async_trait]
impl LanguageModel for ProviderModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, CallError> {
        let mut messages = vec![ChatMessage::system(request.system.clone())];
        match &request.image {
            Some(image) => messages.push(ChatMessage::user_with_images(
                request.user.clone(),
                vec![to_image_data(image)],
            )),
            None => messages.push(ChatMessage::user(request.user.clone())),
        }

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&e))?;

        debug!(
            "{:?}: {} input tokens, {} output tokens",
            request.kind, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn to_image_data(image: &EncodedImage) -> ImageData {
    ImageData::new(image.data.clone(), image.mime_type.clone()).with_detail("high")
}

/// Status code stated explicitly in an API error body, e.g. "status: 503"
/// or "HTTP 429". Bare numbers are never read as a status.
static RE_HTTP_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:status(?:\s+code)?|http)\s*:?\s*([45]\d\d)\b").expect("static regex")
});

/// Map a provider error onto a [`CallError`].
///
/// The typed variant decides: network failures and timeouts are transient,
/// rate limits are a 429, and auth, invalid-request, token-limit and
/// missing-model errors are permanent. Generic API errors keep the status
/// they state, if any.
pub fn classify_provider_error(err: &LlmError) -> CallError {
    let message = err.to_string();
    let status = |code: u16| CallError::Status {
        code,
        message: message.clone(),
    };
    match err {
        LlmError::Timeout => CallError::Timeout { secs: 0 },
        LlmError::NetworkError(_) => CallError::Transport(message.clone()),
        LlmError::RateLimited(_) => status(429),
        LlmError::AuthError(_) => status(401),
        LlmError::ModelNotFound(_) => status(404),
        LlmError::TokenLimitExceeded { .. } => status(413),
        LlmError::InvalidRequest(_) | LlmError::ConfigError(_) | LlmError::NotSupported(_) => {
            status(400)
        }
        LlmError::ApiError(body) => match RE_HTTP_STATUS
            .captures(body)
            .and_then(|caps| caps[1].parse::<u16>().ok())
        {
            Some(code) => status(code),
            None => CallError::Transport(message.clone()),
        },
        LlmError::ProviderError(_) | LlmError::SerializationError(_) | LlmError::Unknown(_) => {
            CallError::Transport(message.clone())
        }
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`DEFAULT_MODEL`].
/// 3. **Environment pair** (`DOCQUEST_LLM_PROVIDER` + `DOCQUEST_MODEL`).
/// 4. **OpenAI key present** (`OPENAI_API_KEY`): OpenAI with the configured
///    or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, DocQuestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("DOCQUEST_LLM_PROVIDER"),
        std::env::var("DOCQUEST_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocQuestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocQuestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocQuestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retryable(err: LlmError) -> bool {
        classify_provider_error(&err).is_retryable()
    }

    #[test]
    fn transient_variants_retry() {
        assert!(matches!(
            classify_provider_error(&LlmError::Timeout),
            CallError::Timeout { .. }
        ));
        assert!(retryable(LlmError::NetworkError(
            "error sending request for url (https://api.openai.com:443/v1/chat/completions): \
             connection reset"
                .into()
        )));
        assert_eq!(
            classify_provider_error(&LlmError::RateLimited("slow down".into())),
            CallError::Status {
                code: 429,
                message: "Rate limit exceeded: slow down".into()
            }
        );
        assert!(retryable(LlmError::ProviderError("upstream hiccup".into())));
        assert!(retryable(LlmError::Unknown("???".into())));
    }

    #[test]
    fn permanent_variants_stop() {
        assert!(!retryable(LlmError::AuthError("invalid api key".into())));
        assert!(!retryable(LlmError::InvalidRequest("bad image".into())));
        assert!(!retryable(LlmError::ModelNotFound("gpt-9".into())));
        assert!(!retryable(LlmError::ConfigError("no key".into())));
        assert!(!retryable(LlmError::NotSupported("vision".into())));
        // "got 500" must not be read as a server error.
        assert!(!retryable(LlmError::TokenLimitExceeded {
            max: 4096,
            got: 500
        }));
    }

    #[test]
    fn api_errors_use_only_stated_status() {
        assert_eq!(
            classify_provider_error(&LlmError::ApiError("HTTP 503 Service Unavailable".into())),
            CallError::Status {
                code: 503,
                message: "API error: HTTP 503 Service Unavailable".into()
            }
        );
        assert!(!retryable(LlmError::ApiError("status: 400, bad payload".into())));
        assert!(matches!(
            classify_provider_error(&LlmError::ApiError(
                "connect to api.example.com:443 failed after 450ms".into()
            )),
            CallError::Transport(_)
        ));
    }
}
