//! Service facade over the index, retriever, answer engine, and source.
//!
//! [`QaService`] is what the route layer talks to. It owns one
//! [`DocumentIndex`] and the injected collaborators, so there is no global
//! state: tests and the server each construct their own instance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::answer::{Answer, AnswerConfig, AnswerEngine};
use crate::completion::CompletionProvider;
use crate::embedding::EmbeddingProvider;
use crate::error::{QaError, Result};
use crate::index::{DocumentIndex, RebuildReport, DEFAULT_INDEX_PAGE_SIZE};
use crate::models::{CreatedDocument, DocumentListing, ListFilter, ScoredDocument};
use crate::retriever::{RetrievalParams, Retriever};
use crate::source::DocumentSource;
use crate::tokenizer::Tokenizer;

/// Default page size for file listings.
pub const DEFAULT_LIST_PAGE_SIZE: u32 = 10;

/// Tunables for a [`QaService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub retrieval: RetrievalParams,
    pub answer: AnswerConfig,
    /// Files requested from the source per rebuild.
    pub index_page_size: u32,
    /// Default page size for `list_files`.
    pub list_page_size: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            retrieval: RetrievalParams::default(),
            answer: AnswerConfig::default(),
            index_page_size: DEFAULT_INDEX_PAGE_SIZE,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
        }
    }
}

/// Summary of one indexed document.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedDocument {
    pub id: String,
    pub name: String,
    pub content_chars: usize,
    pub dims: usize,
}

/// Point-in-time description of the index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub generation: u64,
    pub built_at: Option<DateTime<Utc>>,
    pub count: usize,
    pub rebuilding: bool,
    pub documents: Vec<IndexedDocument>,
}

/// Document question-answering service.
pub struct QaService {
    index: Arc<DocumentIndex>,
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    engine: AnswerEngine,
    retriever: Retriever,
    list_page_size: u32,
}

impl QaService {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        tokenizer: Arc<dyn Tokenizer>,
        settings: ServiceSettings,
    ) -> Self {
        let index = Arc::new(DocumentIndex::with_page_size(settings.index_page_size));
        let retriever = Retriever::new(settings.retrieval);
        let engine = AnswerEngine::new(
            index.clone(),
            embedder.clone(),
            completer,
            tokenizer,
            retriever.clone(),
            settings.answer,
        );
        Self {
            index,
            source,
            embedder,
            engine,
            retriever,
            list_page_size: settings.list_page_size,
        }
    }

    pub fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    pub fn retrieval_params(&self) -> &RetrievalParams {
        self.retriever.params()
    }

    /// Rebuild the index from the document source.
    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        self.index
            .rebuild(self.source.as_ref(), self.embedder.as_ref())
            .await
    }

    /// Best matches for `query`, highest score first.
    ///
    /// `max_results` defaults to the retrieval `max_count` and is clamped
    /// to `max_count_cap`. No score threshold is applied.
    ///
    /// # Errors
    ///
    /// [`QaError::EmbeddingFailed`] if the query cannot be embedded.
    pub async fn search(
        &self,
        query: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<ScoredDocument>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QaError::InvalidRequest("query must not be empty".to_string()));
        }

        let generation = self.index.snapshot();
        if generation.is_empty() {
            debug!("search against empty index");
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await.map_err(|e| match e {
            QaError::EmbeddingFailed(_) => e,
            other => QaError::EmbeddingFailed(other.to_string()),
        })?;

        let limit = self.retriever.params().resolve_count(max_results);
        Ok(self.retriever.top(&vector, &generation, limit))
    }

    /// Answer a question. See [`AnswerEngine::ask`].
    pub async fn ask(&self, question: &str, use_documents: bool) -> Result<Answer> {
        self.engine.ask(question, use_documents).await
    }

    /// Rebuild the index, then answer.
    ///
    /// A failed rebuild is logged and the question is answered from
    /// whatever generation is current, falling back to an ungrounded
    /// answer when that is empty.
    pub async fn refresh_and_ask(&self, question: &str, use_documents: bool) -> Result<Answer> {
        if use_documents {
            match self.rebuild_index().await {
                Ok(report) => debug!(count = report.count, "index refreshed before ask"),
                Err(e) => warn!(error = %e, "index refresh failed, answering from current index"),
            }
        }
        self.ask(question, use_documents).await
    }

    /// List files at the source.
    pub async fn list_files(
        &self,
        page_size: Option<u32>,
        content_type: Option<&str>,
    ) -> Result<Vec<DocumentListing>> {
        let filter = ListFilter {
            page_size: Some(page_size.unwrap_or(self.list_page_size).max(1)),
            content_type: content_type
                .filter(|ct| !ct.trim().is_empty())
                .map(str::to_string),
        };
        self.source.list(&filter).await
    }

    /// Plain-text content of one document.
    pub async fn read_document(&self, id: &str) -> Result<String> {
        let id = id.trim();
        if id.is_empty() {
            return Err(QaError::InvalidRequest("file_id must not be empty".to_string()));
        }
        self.source.get_content(id).await
    }

    /// Create a document at the source.
    pub async fn create_document(&self, title: &str, content: &str) -> Result<CreatedDocument> {
        let title = title.trim();
        if title.is_empty() {
            return Err(QaError::InvalidRequest("title must not be empty".to_string()));
        }
        self.source.create(title, content).await
    }

    pub fn index_status(&self) -> IndexStatus {
        let generation = self.index.snapshot();
        IndexStatus {
            generation: generation.number,
            built_at: generation.built_at,
            count: generation.len(),
            rebuilding: self.index.is_rebuilding(),
            documents: generation
                .records()
                .iter()
                .map(|r| IndexedDocument {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    content_chars: r.content.chars().count(),
                    dims: r.embedding.len(),
                })
                .collect(),
        }
    }
}
