//! Conversation session: the ingested document collection plus chat history.
//!
//! A [`Session`] is owned by one caller (a CLI run, one user of a service).
//! Records are keyed by document name, so re-adding a document replaces the
//! earlier record. History is append-only and grows without bound; a turn is
//! appended only after a successful answer.

use crate::answer;
use crate::config::PipelineConfig;
use crate::error::DocQuestError;
use crate::output::{ChatTurn, DocumentRecord};
use crate::pipeline::llm::LanguageModel;
use crate::pipeline::retry::RetryPolicy;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Documents and conversation turns for one caller.
pub struct Session {
    model: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    answer_max_tokens: usize,
    documents: BTreeMap<String, DocumentRecord>,
    history: Vec<ChatTurn>,
}

impl Session {
    /// Start an empty session using the config's retry and token settings.
    pub fn new(model: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            policy: config.retry_policy(),
            answer_max_tokens: config.answer_max_tokens,
            documents: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Add a record, replacing any record with the same name.
    ///
    /// Returns the replaced record, if any.
    pub fn add_document(&mut self, record: DocumentRecord) -> Option<DocumentRecord> {
        debug!(
            "Session: adding '{}' ({} pages)",
            record.document_name,
            record.page_count()
        );
        self.documents.insert(record.document_name.clone(), record)
    }

    pub fn remove_document(&mut self, name: &str) -> Option<DocumentRecord> {
        self.documents.remove(name)
    }

    pub fn documents(&self) -> &BTreeMap<String, DocumentRecord> {
        &self.documents
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Answer a question against every document in the session.
    ///
    /// On success the turn is appended to the history; on failure the
    /// history is left untouched.
    pub async fn ask(&mut self, question: &str) -> Result<String, DocQuestError> {
        let reply = answer::answer(
            self.model.as_ref(),
            &self.policy,
            self.answer_max_tokens,
            &self.documents,
            question,
            &self.history,
        )
        .await?;
        self.history.push(ChatTurn::new(question, reply.clone()));
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::output::PageRecord;
    use crate::pipeline::llm::ModelRequest;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl LanguageModel for Echo {
        async fn complete(&self, request: &ModelRequest) -> Result<String, CallError> {
            if *self.fail.lock().unwrap() {
                return Err(CallError::Status {
                    code: 401,
                    message: "unauthorised".into(),
                });
            }
            let turns = request.user.matches("User: ").count();
            Ok(format!("answer after {turns} turn(s)"))
        }
    }

    fn record(name: &str) -> DocumentRecord {
        DocumentRecord::new(
            name,
            vec![PageRecord {
                page_number: 1,
                full_text: "t".into(),
                text_summary: "s".into(),
                image_analysis: Vec::new(),
            }],
        )
    }

    fn session(fail: bool) -> Session {
        Session::new(
            Arc::new(Echo {
                fail: Mutex::new(fail),
            }),
            &PipelineConfig::default(),
        )
    }

    #[test]
    fn same_name_replaces_record() {
        let mut s = session(false);
        assert!(s.add_document(record("a.pdf")).is_none());
        assert!(s.add_document(record("a.pdf")).is_some());
        s.add_document(record("b.pdf"));
        assert_eq!(s.documents().len(), 2);
        assert!(s.remove_document("a.pdf").is_some());
        assert_eq!(s.documents().len(), 1);
    }

    #[tokio::test]
    async fn successful_answers_extend_history() {
        let mut s = session(false);
        s.add_document(record("a.pdf"));
        assert_eq!(s.ask("first?").await.unwrap(), "answer after 0 turn(s)");
        assert_eq!(s.ask("second?").await.unwrap(), "answer after 1 turn(s)");
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.history()[0].question, "first?");
        s.clear_history();
        assert!(s.history().is_empty());
    }

    #[tokio::test]
    async fn failed_answer_leaves_history_untouched() {
        let mut s = session(true);
        s.add_document(record("a.pdf"));
        assert!(matches!(
            s.ask("q").await,
            Err(DocQuestError::AnswerFailed { attempts: 1, .. })
        ));
        assert!(s.history().is_empty());
    }

    #[tokio::test]
    async fn asking_without_documents_fails() {
        let mut s = session(false);
        assert!(matches!(s.ask("q").await, Err(DocQuestError::NoDocuments)));
    }
}
