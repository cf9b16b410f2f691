//! Output types: the page-ordered knowledge artifact and chat turns.
//!
//! Every type here serialises to plain nested objects/arrays so a
//! [`DocumentRecord`] can be exported, persisted, or fed back in later
//! without the pipeline being involved.

use crate::error::DocQuestError;
use serde::{Deserialize, Serialize};

/// Explanation of one rasterised, image-dominant page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    /// 1-indexed page the image was rendered from.
    pub page_number: usize,
    /// Free text; holds a sentinel error string when the call failed.
    pub explanation: String,
}

/// One page's processed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-indexed page number, unique within a document.
    pub page_number: usize,
    /// Extracted raw text (may be empty).
    pub full_text: String,
    /// Condensed text. Never absent: failures store a sentinel string.
    pub text_summary: String,
    /// Zero or one entries; one per rasterisation of the page.
    #[serde(default)]
    pub image_analysis: Vec<ImageAnalysis>,
}

impl PageRecord {
    /// Placeholder for a page whose processing failed outright.
    pub fn placeholder(page_number: usize) -> Self {
        Self {
            page_number,
            full_text: String::new(),
            text_summary: crate::prompts::PAGE_PLACEHOLDER_SUMMARY.to_string(),
            image_analysis: Vec::new(),
        }
    }
}

/// The per-document knowledge artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Original upload name.
    #[serde(alias = "name")]
    pub document_name: String,
    /// Sorted ascending by `page_number`, one entry per page.
    pub pages: Vec<PageRecord>,
}

impl DocumentRecord {
    /// Build a record, restoring page order.
    pub fn new(document_name: impl Into<String>, mut pages: Vec<PageRecord>) -> Self {
        pages.sort_by_key(|p| p.page_number);
        Self {
            document_name: document_name.into(),
            pages,
        }
    }

    /// Number of pages in the record.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Look up a page by its 1-indexed number.
    pub fn page(&self, page_number: usize) -> Option<&PageRecord> {
        self.pages
            .binary_search_by_key(&page_number, |p| p.page_number)
            .ok()
            .map(|i| &self.pages[i])
    }

    /// Serialise as pretty JSON.
    pub fn to_json(&self) -> Result<String, DocQuestError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DocQuestError::Internal(format!("serialise record: {e}")))
    }

    /// Load a previously exported record. Pages are re-sorted on load.
    pub fn from_json(json: &str) -> Result<Self, DocQuestError> {
        let record: DocumentRecord = serde_json::from_str(json)
            .map_err(|e| DocQuestError::InvalidConfig(format!("not a document record: {e}")))?;
        Ok(DocumentRecord::new(record.document_name, record.pages))
    }
}

/// One question/answer exchange in a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

impl ChatTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Statistics for one ingested document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Pages in the PDF.
    pub total_pages: usize,
    /// Batches the pages were split into.
    pub batches: usize,
    /// Pages classified image/graphic-dominant.
    pub image_pages: usize,
    /// Pages whose summary is a sentinel value.
    pub failed_summaries: usize,
    /// Image explanations that are a sentinel value.
    pub failed_explanations: usize,
    /// Pages replaced wholesale by a placeholder.
    pub placeholder_pages: usize,
    /// Wall-clock for conversion + parsing.
    pub prepare_duration_ms: u64,
    /// Wall-clock for the batch fan-out.
    pub process_duration_ms: u64,
}

/// Result of ingesting one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedDocument {
    pub record: DocumentRecord,
    /// System instruction used for every summary of this document.
    pub persona: String,
    pub stats: IngestStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize) -> PageRecord {
        PageRecord {
            page_number: n,
            full_text: format!("text {n}"),
            text_summary: format!("summary {n}"),
            image_analysis: Vec::new(),
        }
    }

    #[test]
    fn new_sorts_pages() {
        let record = DocumentRecord::new("doc.pdf", vec![page(3), page(1), page(2)]);
        let numbers: Vec<usize> = record.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(record.page(2).map(|p| p.full_text.as_str()), Some("text 2"));
        assert!(record.page(4).is_none());
    }

    #[test]
    fn json_uses_documented_field_names() {
        let mut p = page(1);
        p.image_analysis.push(ImageAnalysis {
            page_number: 1,
            explanation: "a chart".into(),
        });
        let record = DocumentRecord::new("doc.pdf", vec![p]);
        let value: serde_json::Value =
            serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["document_name"], "doc.pdf");
        assert_eq!(value["pages"][0]["page_number"], 1);
        assert_eq!(value["pages"][0]["full_text"], "text 1");
        assert_eq!(value["pages"][0]["text_summary"], "summary 1");
        assert_eq!(value["pages"][0]["image_analysis"][0]["page_number"], 1);
        assert_eq!(value["pages"][0]["image_analysis"][0]["explanation"], "a chart");
    }

    #[test]
    fn from_json_accepts_name_alias_and_resorts() {
        let json = r#"{"name":"old.pdf","pages":[
            {"page_number":2,"full_text":"","text_summary":"b","image_analysis":[]},
            {"page_number":1,"full_text":"","text_summary":"a"}]}"#;
        let record = DocumentRecord::from_json(json).unwrap();
        assert_eq!(record.document_name, "old.pdf");
        assert_eq!(record.pages[0].page_number, 1);
        assert!(record.pages[0].image_analysis.is_empty());
    }

    #[test]
    fn placeholder_has_fixed_summary_and_no_content() {
        let p = PageRecord::placeholder(4);
        assert_eq!(p.page_number, 4);
        assert_eq!(p.text_summary, crate::prompts::PAGE_PLACEHOLDER_SUMMARY);
        assert!(p.full_text.is_empty());
        assert!(p.image_analysis.is_empty());
        assert_ne!(p, page(4));
    }
}
