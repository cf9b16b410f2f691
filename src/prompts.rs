//! Prompts and sentinel strings for every language-model call.
//!
//! Centralising every instruction here keeps the retry and orchestration
//! code free of prose, and lets unit tests inspect the exact text that will
//! be sent without spinning up a provider.
//!
//! Sentinel strings live here too: they are what downstream consumers see
//! in place of a missing result, so they must stay stable.

/// System instruction used for summaries when no persona is inferred.
pub const DEFAULT_PERSONA: &str = "You are an assistant that summarizes text with context.";

/// System instruction for persona inference.
pub const PERSONA_SYSTEM_PROMPT: &str = "You write system instructions for a summarization assistant. \
Given a document excerpt, identify its domain, audience, tone and writing style, then write a short \
system instruction (at most five sentences, second person, starting with \"You are\") that makes an \
assistant summarize pages of this document consistently in that domain and style. \
Output only the instruction.";

/// Build the persona-inference request from a sample of the document text.
pub fn persona_prompt(document_sample: &str) -> String {
    format!("Document excerpt:\n\"\"\"\n{document_sample}\n\"\"\"")
}

/// Rules appended to the persona for every summarisation call.
pub const SUMMARY_RULES: &str = r#"

When summarizing a page:
- Rewrite the page text concisely.
- Preserve every factual statement, figure, name and date.
- Preserve list structure and references (numbered items, citations, section numbers).
- Do not introduce information that is not in the page text.
- The previous summary is context for continuity only; do not repeat or merge it into your output."#;

/// Full system message for summarisation: persona followed by the rules.
pub fn summary_system_prompt(persona: &str) -> String {
    format!("{}{}", persona.trim(), SUMMARY_RULES)
}

/// User message for one page summary.
pub fn summary_prompt(page_number: usize, previous_summary: &str, page_text: &str) -> String {
    let previous = if previous_summary.trim().is_empty() {
        "(none, this is the first page of the sequence)"
    } else {
        previous_summary
    };
    format!(
        "Summarize the following page (Page {page_number}) with context from the previous summary.\n\n\
         Previous summary: {previous}\n\n\
         Text:\n{page_text}\n"
    )
}

/// System instruction for image explanation.
pub const IMAGE_SYSTEM_PROMPT: &str = "You are a helpful assistant that responds in Markdown.";

/// User instruction sent alongside the rendered page image.
pub const IMAGE_INSTRUCTION: &str = "Explain the content of this image in a single, coherent paragraph. \
The explanation should be concise and semantically meaningful. Describe only what is visibly depicted \
(text, labels, axes, values, shapes, relationships); do not speculate about anything that is not shown.";

/// System instruction for question answering.
pub const ANSWER_SYSTEM_PROMPT: &str =
    "You are an assistant that answers questions based on provided knowledge base.";

/// User message for question answering.
pub fn answer_prompt(question: &str, context: &str, conversation: &str) -> String {
    let conversation = if conversation.is_empty() {
        "(no previous questions)\n"
    } else {
        conversation
    };
    format!(
        "Answer the question using only the context below as knowledge base, in a clear readable format.\n\
         Rules:\n\
         - Use only facts stated in the context.\n\
         - If the context does not contain the information, say explicitly that it is not available in the documents; do not infer it.\n\
         - Cite the document name and page number(s) for every factual claim, e.g. (report.pdf, p. 3).\n\n\
         Question: {question}\n\n\
         Context:\n{context}\n\
         Previous responses over the current chat session:\n{conversation}"
    )
}

// ── Sentinels and markers ───────────────────────────────────────────────────

/// Summary stored when every summarisation attempt failed.
pub fn summary_failed(page_number: usize) -> String {
    format!("Error: Unable to summarize page {page_number} due to network issues or API error.")
}

/// Explanation stored when every explanation attempt failed.
pub const EXPLANATION_FAILED: &str =
    "Error: Unable to fetch image explanation due to network issues or API error.";

/// Summary stored for a page that could not be processed at all.
pub const PAGE_PLACEHOLDER_SUMMARY: &str = "Error in processing this page";

/// Summary stored for a page with no extractable text.
pub const EMPTY_PAGE_SUMMARY: &str = "No extractable text on this page.";

/// Context marker for a page without text.
pub const NO_TEXT_MARKER: &str = "No text available.";

/// Context marker for a page without image analysis.
pub const NO_IMAGE_ANALYSIS_MARKER: &str = "No image analysis.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prompt_carries_page_and_context() {
        let p = summary_prompt(4, "earlier summary", "page body");
        assert!(p.contains("Page 4"));
        assert!(p.contains("Previous summary: earlier summary"));
        assert!(p.contains("Text:\npage body"));
    }

    #[test]
    fn summary_prompt_marks_missing_context() {
        let p = summary_prompt(1, "", "body");
        assert!(p.contains("first page of the sequence"));
    }

    #[test]
    fn summary_system_prompt_keeps_persona_first() {
        let s = summary_system_prompt("You are a legal analyst.");
        assert!(s.starts_with("You are a legal analyst."));
        assert!(s.contains("Do not introduce information"));
    }

    #[test]
    fn answer_prompt_demands_citations_and_absence() {
        let p = answer_prompt("What is X?", "ctx", "");
        assert!(p.contains("Question: What is X?"));
        assert!(p.contains("Cite the document name and page number"));
        assert!(p.contains("not available in the documents"));
        assert!(p.contains("(no previous questions)"));
    }

    #[test]
    fn summary_sentinel_names_the_page() {
        assert!(summary_failed(9).contains("page 9"));
    }
}
