//! Page summarisation and persona inference.
//!
//! A summary request carries the page number, the previous page's summary
//! (context only) and the normalised page text, under a system instruction
//! made of the document persona plus fixed summarisation rules. Requests
//! are sent at temperature 0 through the shared [`RetryPolicy`].

use crate::error::{CallError, PageError};
use crate::pipeline::llm::{LanguageModel, ModelRequest, RequestKind};
use crate::pipeline::postprocess::clean_response;
use crate::pipeline::retry::RetryPolicy;
use crate::prompts;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tokens allowed for the persona instruction.
const PERSONA_MAX_TOKENS: usize = 256;

/// Produces page summaries against one [`LanguageModel`].
#[derive(Clone)]
pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    max_tokens: usize,
}

impl Summarizer {
    pub fn new(model: Arc<dyn LanguageModel>, policy: RetryPolicy, max_tokens: usize) -> Self {
        Self {
            model,
            policy,
            max_tokens,
        }
    }

    /// Summarise one page.
    ///
    /// `text` should already be normalised; `previous_summary` is empty for
    /// the first page of a chain.
    pub async fn summarize(
        &self,
        text: &str,
        previous_summary: &str,
        page_number: usize,
        persona: &str,
    ) -> Result<String, PageError> {
        let request = ModelRequest {
            kind: RequestKind::Summary,
            system: prompts::summary_system_prompt(persona),
            user: prompts::summary_prompt(page_number, previous_summary, text),
            image: None,
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        let label = format!("summary page {page_number}");
        let summary = self
            .policy
            .run(&label, || complete_non_empty(self.model.as_ref(), &request))
            .await
            .map_err(|e| PageError::SummaryFailed {
                page: page_number,
                attempts: e.attempts,
                detail: e.last_error.to_string(),
            })?;

        debug!("Page {}: summary {} chars", page_number, summary.len());
        Ok(summary)
    }
}

/// Run one request and clean the reply; an empty reply counts as a
/// transport failure so it is retried.
pub(crate) async fn complete_non_empty(
    model: &dyn LanguageModel,
    request: &ModelRequest,
) -> Result<String, CallError> {
    let raw = model.complete(request).await?;
    let cleaned = clean_response(&raw);
    if cleaned.is_empty() {
        return Err(CallError::Transport(format!(
            "{:?} request returned an empty completion",
            request.kind
        )));
    }
    Ok(cleaned)
}

/// Derive a summarisation persona from the document's own text.
///
/// Sends at most `sample_chars` characters. Fails soft: an empty document
/// or an exhausted request yields [`prompts::DEFAULT_PERSONA`].
pub async fn infer_persona(
    model: &dyn LanguageModel,
    policy: &RetryPolicy,
    document_text: &str,
    sample_chars: usize,
) -> String {
    let text = document_text.trim();
    if text.is_empty() {
        return prompts::DEFAULT_PERSONA.to_string();
    }

    let sample: String = text.chars().take(sample_chars.max(1)).collect();
    let request = ModelRequest {
        kind: RequestKind::Persona,
        system: prompts::PERSONA_SYSTEM_PROMPT.to_string(),
        user: prompts::persona_prompt(&sample),
        image: None,
        temperature: 0.0,
        max_tokens: PERSONA_MAX_TOKENS,
    };

    match policy
        .run("persona", || complete_non_empty(model, &request))
        .await
    {
        Ok(persona) => {
            info!("Inferred persona: {}", persona);
            persona
        }
        Err(e) => {
            warn!(
                "Persona inference failed after {} attempt(s): {}; using default",
                e.attempts, e.last_error
            );
            prompts::DEFAULT_PERSONA.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Duration;

    /// Replays scripted replies and records every request.
    struct Scripted {
        replies: Mutex<Vec<Result<String, CallError>>>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, CallError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn complete(&self, request: &ModelRequest) -> Result<String, CallError> {
            self.seen.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(CallError::Transport("script exhausted".into()))
            } else {
                replies.remove(0)
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            call_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn summary_request_shape() {
        let model = Arc::new(Scripted::new(vec![Ok("```\nShort summary.\n```".into())]));
        let s = Summarizer::new(model.clone(), policy(), 512);
        let out = s
            .summarize("page body", "prior", 3, "You are a tax advisor.")
            .await
            .unwrap();
        assert_eq!(out, "Short summary.");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, RequestKind::Summary);
        assert_eq!(seen[0].temperature, 0.0);
        assert_eq!(seen[0].max_tokens, 512);
        assert!(seen[0].system.starts_with("You are a tax advisor."));
        assert!(seen[0].user.contains("Page 3"));
        assert!(seen[0].user.contains("Previous summary: prior"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_reply_is_retried() {
        let model = Arc::new(Scripted::new(vec![Ok("   ".into()), Ok("ok".into())]));
        let s = Summarizer::new(model.clone(), policy(), 512);
        assert_eq!(s.summarize("t", "", 1, "p").await.unwrap(), "ok");
        assert_eq!(model.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_summary_failed() {
        let model = Arc::new(Scripted::new(Vec::new()));
        let s = Summarizer::new(model, policy(), 512);
        let err = s.summarize("t", "", 8, "p").await.unwrap_err();
        assert!(matches!(err, PageError::SummaryFailed { page: 8, attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn persona_falls_back_to_default() {
        let model = Scripted::new(Vec::new());
        let p = infer_persona(&model, &policy(), "some document text", 100).await;
        assert_eq!(p, prompts::DEFAULT_PERSONA);
    }

    #[tokio::test(start_paused = true)]
    async fn persona_skips_call_for_empty_document() {
        let model = Scripted::new(vec![Ok("unused".into())]);
        let p = infer_persona(&model, &policy(), "   ", 100).await;
        assert_eq!(p, prompts::DEFAULT_PERSONA);
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn persona_sample_is_truncated() {
        let model = Scripted::new(vec![Ok("You are a historian.".into())]);
        let text = "x".repeat(500);
        let p = infer_persona(&model, &policy(), &text, 40).await;
        assert_eq!(p, "You are a historian.");
        let seen = model.seen.lock().unwrap();
        assert!(seen[0].user.contains(&"x".repeat(40)));
        assert!(!seen[0].user.contains(&"x".repeat(41)));
    }
}
