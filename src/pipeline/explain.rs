//! Image explanation for image/graphic-dominant pages.

use crate::error::PageError;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::llm::{LanguageModel, ModelRequest, RequestKind};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::summarize::complete_non_empty;
use crate::prompts;
use std::sync::Arc;
use tracing::debug;

/// Tokens allowed for one explanation paragraph.
const EXPLANATION_MAX_TOKENS: usize = 1024;

/// Sends rendered pages to a vision-capable [`LanguageModel`].
#[derive(Clone)]
pub struct ImageExplainer {
    model: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    temperature: f32,
}

impl ImageExplainer {
    pub fn new(model: Arc<dyn LanguageModel>, policy: RetryPolicy, temperature: f32) -> Self {
        Self {
            model,
            policy,
            temperature,
        }
    }

    /// Explain one rendered page in a single paragraph.
    pub async fn explain(
        &self,
        image: &EncodedImage,
        page_number: usize,
    ) -> Result<String, PageError> {
        let request = ModelRequest {
            kind: RequestKind::ImageExplanation,
            system: prompts::IMAGE_SYSTEM_PROMPT.to_string(),
            user: prompts::IMAGE_INSTRUCTION.to_string(),
            image: Some(image.clone()),
            temperature: self.temperature,
            max_tokens: EXPLANATION_MAX_TOKENS,
        };

        let label = format!("image explanation page {page_number}");
        let explanation = self
            .policy
            .run(&label, || complete_non_empty(self.model.as_ref(), &request))
            .await
            .map_err(|e| PageError::ExplanationFailed {
                page: page_number,
                attempts: e.attempts,
                detail: e.last_error.to_string(),
            })?;

        debug!("Page {}: explanation {} chars", page_number, explanation.len());
        Ok(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Duration;

    struct Recorder {
        reply: Result<String, CallError>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    #[async_trait]
    impl LanguageModel for Recorder {
        async fn complete(&self, request: &ModelRequest) -> Result<String, CallError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn image() -> EncodedImage {
        EncodedImage {
            data: "aGVsbG8=".into(),
            mime_type: "image/png".into(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            call_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn request_carries_image_and_temperature() {
        let model = Arc::new(Recorder {
            reply: Ok("A bar chart of revenue by year.".into()),
            seen: Mutex::new(Vec::new()),
        });
        let explainer = ImageExplainer::new(model.clone(), policy(), 0.2);
        let out = explainer.explain(&image(), 2).await.unwrap();
        assert_eq!(out, "A bar chart of revenue by year.");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].kind, RequestKind::ImageExplanation);
        assert_eq!(seen[0].image.as_ref(), Some(&image()));
        assert_eq!(seen[0].temperature, 0.2);
        assert!(seen[0].user.contains("single, coherent paragraph"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_explanation_failed() {
        let model = Arc::new(Recorder {
            reply: Err(CallError::Status {
                code: 500,
                message: "boom".into(),
            }),
            seen: Mutex::new(Vec::new()),
        });
        let explainer = ImageExplainer::new(model.clone(), policy(), 0.0);
        let err = explainer.explain(&image(), 5).await.unwrap_err();
        assert!(matches!(
            err,
            PageError::ExplanationFailed {
                page: 5,
                attempts: 2,
                ..
            }
        ));
        assert_eq!(model.seen.lock().unwrap().len(), 2);
    }
}
