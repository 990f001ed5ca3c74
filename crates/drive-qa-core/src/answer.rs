//! Question answering over the document index.
//!
//! [`AnswerEngine::ask`] runs a small per-request state machine:
//!
//! ```text
//! Start ─▶ Retrieve ─▶ PackContext ─▶ CompleteGrounded ─▶ Done
//!   │          │            │                 │
//!   └──────────┴────────────┴─────────────────┴──▶ CompleteUngrounded ─▶ Done
//! ```
//!
//! Every exit to `CompleteUngrounded` records a [`FallbackReason`]. Only a
//! failure on the ungrounded path itself reaches the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::completion::{ChatMessage, CompletionProvider, CompletionRequest};
use crate::embedding::EmbeddingProvider;
use crate::error::{QaError, Result};
use crate::index::{DocumentIndex, Generation};
use crate::models::DocumentRecord;
use crate::retriever::Retriever;
use crate::tokenizer::Tokenizer;

/// Literal reply the grounded prompt asks for when documents lack the answer.
pub const NOT_IN_DOCUMENTS: &str = "I don't know based on the provided documents.";

const GROUNDED_SYSTEM: &str =
    "You are a helpful assistant that answers using only the provided documents.";

const UNGROUNDED_SYSTEM: &str = "You are a helpful assistant with access to general knowledge. \
     Answer questions clearly and accurately.";

const CHUNK_SEPARATOR: &str = "\n\n";

/// Answer-engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerConfig {
    /// Characters of each document's content placed in the context.
    pub per_doc_char_cap: usize,
    /// Token budget for the packed document context.
    pub context_token_budget: usize,
    /// Hard cap on the whole prompt (system + user messages).
    pub prompt_token_cap: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            per_doc_char_cap: 1000,
            context_token_budget: 6000,
            prompt_token_cap: 8000,
            temperature: 0.2,
            max_output_tokens: 512,
        }
    }
}

/// Document text selected for one answer, bounded by a token budget.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextWindow {
    chunks: Vec<String>,
    document_names: Vec<String>,
    token_count: usize,
}

impl ContextWindow {
    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn document_names(&self) -> &[String] {
        &self.document_names
    }

    /// Token count of [`render`](Self::render).
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks joined by blank lines.
    pub fn render(&self) -> String {
        self.chunks.join(CHUNK_SEPARATOR)
    }
}

/// Format one context chunk: `"{name}:\n{content[..cap]}"`.
fn format_chunk(record: &DocumentRecord, per_doc_char_cap: usize) -> String {
    format!(
        "{}:\n{}",
        record.name,
        truncate_chars(&record.content, per_doc_char_cap)
    )
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Pack ranked documents into a context window under `token_budget`.
///
/// Chunks are added in order. Before accepting a chunk, the rendered
/// context including it is measured; the first chunk that would push the
/// count over the budget stops packing, and later chunks are not tried.
pub fn pack_context(
    selected: &[Arc<DocumentRecord>],
    per_doc_char_cap: usize,
    token_budget: usize,
    tokenizer: &dyn Tokenizer,
) -> ContextWindow {
    let mut window = ContextWindow::default();
    let mut rendered = String::new();

    for record in selected {
        let chunk = format_chunk(record, per_doc_char_cap);
        let candidate = if rendered.is_empty() {
            chunk.clone()
        } else {
            format!("{}{}{}", rendered, CHUNK_SEPARATOR, chunk)
        };

        let tokens = tokenizer.count_tokens(&candidate);
        if tokens > token_budget {
            debug!(
                doc_id = %record.id,
                tokens,
                token_budget,
                "context budget reached"
            );
            break;
        }

        rendered = candidate;
        window.token_count = tokens;
        window.chunks.push(chunk);
        window.document_names.push(record.name.clone());
    }

    window
}

/// Build the messages for a document-grounded completion.
pub fn grounded_messages(question: &str, context: &ContextWindow) -> Vec<ChatMessage> {
    let user = format!(
        "You are an assistant with access to the following documents:\n\n\
         {}\n\n\
         Answer the user's question using ONLY the information from the documents above. \
         If the answer is not contained in the documents, say '{}'\n\n\
         User's question: {}\n",
        context.render(),
        NOT_IN_DOCUMENTS,
        question
    );
    vec![ChatMessage::system(GROUNDED_SYSTEM), ChatMessage::user(user)]
}

/// Build the messages for a general-knowledge completion.
pub fn ungrounded_messages(question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(UNGROUNDED_SYSTEM),
        ChatMessage::user(question),
    ]
}

/// Why an answer was produced without document context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    DocumentsDisabled,
    EmptyIndex,
    QueryEmbeddingFailed,
    NoRelevantDocuments,
    EmptyContext,
    PromptTooLarge,
    GroundedCompletionFailed,
}

/// Final answer returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Whether document context was used.
    pub grounded: bool,
    /// Names of documents in the context, in ranked order.
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
}

enum State {
    Start,
    Retrieve(Arc<Generation>),
    PackContext(Vec<Arc<DocumentRecord>>),
    CompleteGrounded(ContextWindow),
    CompleteUngrounded(FallbackReason),
    Done(Answer),
}

/// Answers questions, grounded in indexed documents when possible.
pub struct AnswerEngine {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    completer: Arc<dyn CompletionProvider>,
    tokenizer: Arc<dyn Tokenizer>,
    retriever: Retriever,
    config: AnswerConfig,
}

impl AnswerEngine {
    pub fn new(
        index: Arc<DocumentIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        tokenizer: Arc<dyn Tokenizer>,
        retriever: Retriever,
        config: AnswerConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            completer,
            tokenizer,
            retriever,
            config,
        }
    }

    pub fn config(&self) -> &AnswerConfig {
        &self.config
    }

    /// Answer `question`, using documents when `use_documents` is set and
    /// the index has something relevant.
    ///
    /// # Errors
    ///
    /// - [`QaError::InvalidRequest`] for an empty question.
    /// - [`QaError::ContextTooLarge`] if the question alone exceeds the
    ///   prompt cap.
    /// - [`QaError::CompletionFailed`] if the ungrounded completion fails.
    pub async fn ask(&self, question: &str, use_documents: bool) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::InvalidRequest("question must not be empty".to_string()));
        }

        let mut state = State::Start;
        loop {
            state = match state {
                State::Start => {
                    if !use_documents {
                        State::CompleteUngrounded(FallbackReason::DocumentsDisabled)
                    } else {
                        let generation = self.index.snapshot();
                        if generation.is_empty() {
                            State::CompleteUngrounded(FallbackReason::EmptyIndex)
                        } else {
                            State::Retrieve(generation)
                        }
                    }
                }
                State::Retrieve(generation) => match self.embedder.embed(question).await {
                    Ok(query) => {
                        let selected = self.retriever.retrieve(&query, &generation);
                        if selected.is_empty() {
                            State::CompleteUngrounded(FallbackReason::NoRelevantDocuments)
                        } else {
                            State::PackContext(selected)
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "query embedding failed, answering without documents");
                        State::CompleteUngrounded(FallbackReason::QueryEmbeddingFailed)
                    }
                },
                State::PackContext(selected) => {
                    let window = pack_context(
                        &selected,
                        self.config.per_doc_char_cap,
                        self.config.context_token_budget,
                        self.tokenizer.as_ref(),
                    );
                    if window.is_empty() {
                        State::CompleteUngrounded(FallbackReason::EmptyContext)
                    } else {
                        debug!(
                            tokens = window.token_count(),
                            documents = window.chunks().len(),
                            "context packed"
                        );
                        State::CompleteGrounded(window)
                    }
                }
                State::CompleteGrounded(window) => {
                    match self.answer_grounded(question, &window).await {
                        Ok(text) => {
                            info!(documents = window.document_names().len(), "grounded answer");
                            State::Done(Answer {
                                answer: text,
                                grounded: true,
                                sources: window.document_names().to_vec(),
                                fallback: None,
                            })
                        }
                        Err(QaError::ContextTooLarge { tokens, cap }) => {
                            warn!(tokens, cap, "grounded prompt over cap");
                            State::CompleteUngrounded(FallbackReason::PromptTooLarge)
                        }
                        Err(e) => {
                            warn!(error = %e, "grounded completion failed, answering without documents");
                            State::CompleteUngrounded(FallbackReason::GroundedCompletionFailed)
                        }
                    }
                }
                State::CompleteUngrounded(reason) => {
                    info!(reason = ?reason, "ungrounded answer");
                    let text = self.answer_ungrounded(question).await?;
                    State::Done(Answer {
                        answer: text,
                        grounded: false,
                        sources: Vec::new(),
                        fallback: Some(reason),
                    })
                }
                State::Done(answer) => return Ok(answer),
            };
        }
    }

    /// One completion constrained to `context`.
    ///
    /// # Errors
    ///
    /// [`QaError::ContextTooLarge`] if the prompt exceeds the cap; nothing
    /// is sent to the provider in that case.
    pub async fn answer_grounded(&self, question: &str, context: &ContextWindow) -> Result<String> {
        let messages = grounded_messages(question, context);
        self.ensure_within_cap(&messages)?;
        self.complete(messages).await
    }

    /// One completion without document context.
    pub async fn answer_ungrounded(&self, question: &str) -> Result<String> {
        let messages = ungrounded_messages(question);
        self.ensure_within_cap(&messages)?;
        self.complete(messages).await
    }

    fn count_message_tokens(&self, messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .map(|m| self.tokenizer.count_tokens(&m.content))
            .sum()
    }

    fn ensure_within_cap(&self, messages: &[ChatMessage]) -> Result<()> {
        let tokens = self.count_message_tokens(messages);
        if tokens > self.config.prompt_token_cap {
            return Err(QaError::ContextTooLarge {
                tokens,
                cap: self.config.prompt_token_cap,
            });
        }
        Ok(())
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = CompletionRequest {
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
        };
        let text = self.completer.complete(&request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(QaError::CompletionFailed("empty completion".to_string()));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::RetrievalParams;
    use crate::tokenizer::WhitespaceTokenizer;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    #[derive(Default)]
    struct EchoCompleter {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionProvider for EchoCompleter {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            let prompt = request.messages[request.messages.len() - 1].content.clone();
            self.prompts.lock().unwrap().push(prompt);
            Ok("answered".to_string())
        }
    }

    fn engine(completer: Arc<EchoCompleter>, prompt_token_cap: usize) -> AnswerEngine {
        AnswerEngine::new(
            Arc::new(DocumentIndex::new()),
            Arc::new(UnitEmbedder),
            completer,
            Arc::new(WhitespaceTokenizer),
            Retriever::new(RetrievalParams::default()),
            AnswerConfig {
                prompt_token_cap,
                ..Default::default()
            },
        )
    }

    fn doc(name: &str, content: &str) -> Arc<DocumentRecord> {
        Arc::new(DocumentRecord {
            id: name.to_lowercase(),
            name: name.to_string(),
            content: content.to_string(),
            embedding: vec![1.0],
        })
    }

    fn words(n: usize) -> String {
        vec!["tok"; n].join(" ")
    }

    #[test]
    fn test_pack_stops_before_budget() {
        // "A:" adds one word, so A packs to 500 tokens.
        let docs = vec![doc("A", &words(499)), doc("B", &words(499))];
        let window = pack_context(&docs, 100_000, 600, &WhitespaceTokenizer);

        assert_eq!(window.document_names(), &["A".to_string()]);
        assert_eq!(window.token_count(), 500);
        assert!(window.render().starts_with("A:\ntok"));
    }

    #[test]
    fn test_pack_never_exceeds_budget() {
        let docs: Vec<_> = (0..10)
            .map(|i| doc(&format!("D{}", i), &words(37 + i * 13)))
            .collect();
        for budget in [0, 10, 38, 100, 250, 1000] {
            let window = pack_context(&docs, 100_000, budget, &WhitespaceTokenizer);
            assert!(WhitespaceTokenizer.count_tokens(&window.render()) <= budget);
        }
    }

    #[test]
    fn test_pack_does_not_skip_ahead() {
        let docs = vec![doc("Big", &words(900)), doc("Small", "tiny")];
        let window = pack_context(&docs, 100_000, 600, &WhitespaceTokenizer);
        assert!(window.is_empty());
    }

    #[test]
    fn test_pack_truncates_on_char_boundary() {
        let docs = vec![doc("Unicode", "ééééé")];
        let window = pack_context(&docs, 3, 100, &WhitespaceTokenizer);
        assert_eq!(window.chunks()[0], "Unicode:\nééé");
    }

    #[test]
    fn test_pack_joins_chunks_with_blank_line() {
        let docs = vec![doc("One", "first"), doc("Two", "second")];
        let window = pack_context(&docs, 1000, 100, &WhitespaceTokenizer);
        assert_eq!(window.render(), "One:\nfirst\n\nTwo:\nsecond");
    }

    #[test]
    fn test_grounded_prompt_contains_fallback_phrase() {
        let docs = vec![doc("Budget", "Q3 revenue was $5M")];
        let window = pack_context(&docs, 1000, 100, &WhitespaceTokenizer);
        let messages = grounded_messages("what was Q3 revenue", &window);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Budget:\nQ3 revenue was $5M"));
        assert!(messages[1].content.contains(NOT_IN_DOCUMENTS));
        assert!(messages[1].content.contains("what was Q3 revenue"));
    }

    #[tokio::test]
    async fn test_answer_grounded_sends_context_prompt() {
        let completer = Arc::new(EchoCompleter::default());
        let engine = engine(completer.clone(), 8000);
        let window = pack_context(
            &[doc("Budget", "Q3 revenue was $5M")],
            1000,
            100,
            &WhitespaceTokenizer,
        );

        let text = engine.answer_grounded("what was Q3 revenue", &window).await.unwrap();

        assert_eq!(text, "answered");
        let prompts = completer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Budget:\nQ3 revenue was $5M"));
        assert!(prompts[0].contains(NOT_IN_DOCUMENTS));
    }

    #[tokio::test]
    async fn test_answer_grounded_over_cap_sends_nothing() {
        let completer = Arc::new(EchoCompleter::default());
        let engine = engine(completer.clone(), 20);
        let window = pack_context(&[doc("Long", &words(50))], 100_000, 1000, &WhitespaceTokenizer);

        let err = engine.answer_grounded("why", &window).await.unwrap_err();

        match err {
            QaError::ContextTooLarge { tokens, cap } => {
                assert_eq!(cap, 20);
                assert!(tokens > 20);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(completer.prompts.lock().unwrap().is_empty());
    }
}
