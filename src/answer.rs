//! Question answering over ingested documents.
//!
//! [`compose_context`] flattens every document record into one plain-text
//! knowledge base; [`format_history`] serialises the conversation so far;
//! [`answer`] sends both to the language model at temperature 0.
//!
//! Unlike page summaries, an answer has no meaningful placeholder: when the
//! retries are exhausted the error reaches the caller.

use crate::error::DocQuestError;
use crate::output::{ChatTurn, DocumentRecord, PageRecord};
use crate::pipeline::llm::{LanguageModel, ModelRequest, RequestKind};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::summarize::complete_non_empty;
use crate::prompts;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{info, warn};

/// Build the knowledge-base context.
///
/// Documents appear in name order, pages in ascending page order. Each page
/// carries its text (or [`prompts::NO_TEXT_MARKER`]), its summary, and its
/// image analyses (or [`prompts::NO_IMAGE_ANALYSIS_MARKER`]).
pub fn compose_context(documents: &BTreeMap<String, DocumentRecord>) -> String {
    let mut context = String::new();
    for (name, record) in documents {
        let _ = writeln!(context, "--- Document: {name} ---");

        let mut pages: Vec<&PageRecord> = record.pages.iter().collect();
        pages.sort_by_key(|p| p.page_number);

        for page in pages {
            let text = if page.full_text.trim().is_empty() {
                prompts::NO_TEXT_MARKER
            } else {
                page.full_text.trim()
            };
            let images = if page.image_analysis.is_empty() {
                prompts::NO_IMAGE_ANALYSIS_MARKER.to_string()
            } else {
                page.image_analysis
                    .iter()
                    .map(|img| format!("Page {}: {}", img.page_number, img.explanation))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            let _ = write!(
                context,
                "Page {}\nText: {}\nSummary: {}\nImage Analysis: {}\n\n",
                page.page_number, text, page.text_summary, images
            );
        }
    }
    context
}

/// Serialise chat turns as alternating `User:` / `Assistant:` lines.
pub fn format_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}\n", turn.question, turn.answer))
        .collect()
}

/// Answer `question` from `documents` and the prior `history`.
///
/// # Errors
/// - [`DocQuestError::NoDocuments`] when the collection is empty; no call
///   is made.
/// - [`DocQuestError::AnswerFailed`] when every attempt failed.
pub async fn answer(
    model: &dyn LanguageModel,
    policy: &RetryPolicy,
    max_tokens: usize,
    documents: &BTreeMap<String, DocumentRecord>,
    question: &str,
    history: &[ChatTurn],
) -> Result<String, DocQuestError> {
    if documents.is_empty() {
        return Err(DocQuestError::NoDocuments);
    }

    let context = compose_context(documents);
    let conversation = format_history(history);
    let request = ModelRequest {
        kind: RequestKind::Answer,
        system: prompts::ANSWER_SYSTEM_PROMPT.to_string(),
        user: prompts::answer_prompt(question, &context, &conversation),
        image: None,
        temperature: 0.0,
        max_tokens,
    };

    info!(
        documents = documents.len(),
        context_chars = context.len(),
        turns = history.len(),
        "Answering question"
    );

    policy
        .run("answer", || complete_non_empty(model, &request))
        .await
        .map_err(|e| {
            warn!("Answer failed after {} attempt(s): {}", e.attempts, e.last_error);
            DocQuestError::AnswerFailed {
                attempts: e.attempts,
                detail: e.last_error.to_string(),
            }
        })
}
