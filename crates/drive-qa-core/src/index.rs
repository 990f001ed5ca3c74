//! In-memory document index with atomic rebuild.
//!
//! The index holds one [`Generation`] at a time behind
//! `RwLock<Arc<Generation>>`. Readers clone the `Arc` under a brief read
//! lock and then work on an immutable snapshot. A rebuild lists the
//! source, fetches and embeds every document into a private buffer, and
//! only takes the write lock to swap the pointer, so a reader sees either
//! the whole old generation or the whole new one.
//!
//! # Rebuild policy
//!
//! One rebuild at a time. A second caller gets
//! [`QaError::RebuildInProgress`] immediately. The in-flight flag is held
//! by a drop guard, so dropping a rebuild future releases it and leaves the
//! previous generation in place.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{QaError, Result};
use crate::models::{DocumentListing, DocumentRecord, ListFilter, GOOGLE_DOC_MIME};
use crate::source::DocumentSource;

/// Default number of files requested from the source per rebuild.
pub const DEFAULT_INDEX_PAGE_SIZE: u32 = 50;

/// One complete, immutable set of indexed documents.
#[derive(Debug, Default)]
pub struct Generation {
    /// Increments by one on every successful rebuild. The initial empty
    /// generation is `0`.
    pub number: u64,
    /// When this generation was swapped in. `None` for the initial one.
    pub built_at: Option<DateTime<Utc>>,
    records: Vec<Arc<DocumentRecord>>,
}

impl Generation {
    pub fn records(&self) -> &[Arc<DocumentRecord>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A document left out of a rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub id: String,
    pub name: String,
    pub reason: String,
}

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    /// Number of records in the new generation.
    pub count: usize,
    pub generation: u64,
    pub skipped: Vec<SkippedDocument>,
}

/// The current generation of indexed documents.
pub struct DocumentIndex {
    current: RwLock<Arc<Generation>>,
    rebuilding: AtomicBool,
    page_size: u32,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_INDEX_PAGE_SIZE)
    }

    /// Create an index that requests up to `page_size` files per rebuild.
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            current: RwLock::new(Arc::new(Generation::default())),
            rebuilding: AtomicBool::new(false),
            page_size,
        }
    }

    /// The current generation as a consistent point-in-time view.
    pub fn snapshot(&self) -> Arc<Generation> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().number
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::Acquire)
    }

    /// Rebuild the index from `source`.
    ///
    /// Lists indexable documents (Google Docs only), fetches each one's
    /// text, embeds `name + "\n" + content`, and swaps in the new
    /// generation. A document whose fetch or embedding fails is logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// - [`QaError::RebuildInProgress`] if another rebuild is running.
    /// - [`QaError::SourceUnavailable`] if listing fails. The previous
    ///   generation stays visible.
    pub async fn rebuild(
        &self,
        source: &dyn DocumentSource,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<RebuildReport> {
        let _guard = RebuildGuard::acquire(&self.rebuilding)?;
        let started = Instant::now();

        let filter = ListFilter {
            page_size: Some(self.page_size),
            content_type: Some(GOOGLE_DOC_MIME.to_string()),
        };
        let listings = source.list(&filter).await.map_err(|e| match e {
            QaError::SourceUnavailable(_) => e,
            other => QaError::SourceUnavailable(other.to_string()),
        })?;
        info!(listed = listings.len(), "rebuilding document index");

        let mut buffer: Vec<Arc<DocumentRecord>> = Vec::with_capacity(listings.len());
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for listing in listings {
            if listing.content_type != GOOGLE_DOC_MIME {
                debug!(doc_id = %listing.id, content_type = %listing.content_type, "not indexable");
                continue;
            }
            if !seen.insert(listing.id.clone()) {
                debug!(doc_id = %listing.id, "duplicate listing ignored");
                continue;
            }

            match index_one(source, embedder, &listing).await {
                Ok(record) => {
                    debug!(doc_id = %record.id, name = %record.name, chars = record.content.len(), "indexed");
                    buffer.push(Arc::new(record));
                }
                Err(e) => {
                    warn!(doc_id = %listing.id, name = %listing.name, error = %e, "skipping document");
                    skipped.push(SkippedDocument {
                        id: listing.id,
                        name: listing.name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let count = buffer.len();
        let generation = self.swap(buffer);

        info!(
            count,
            skipped = skipped.len(),
            generation,
            latency_ms = started.elapsed().as_millis(),
            "document index rebuilt"
        );

        Ok(RebuildReport {
            count,
            generation,
            skipped,
        })
    }

    /// Replace the current generation. Returns the new generation number.
    fn swap(&self, records: Vec<Arc<DocumentRecord>>) -> u64 {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        let number = slot.number + 1;
        *slot = Arc::new(Generation {
            number,
            built_at: Some(Utc::now()),
            records,
        });
        number
    }
}

impl Default for DocumentIndex {
    fn default() -> Self {
        Self::new()
    }
}

async fn index_one(
    source: &dyn DocumentSource,
    embedder: &dyn EmbeddingProvider,
    listing: &DocumentListing,
) -> Result<DocumentRecord> {
    let content = source.get_content(&listing.id).await?;
    let input = DocumentRecord::embedding_input(&listing.name, &content);
    let embedding = embedder.embed(&input).await?;
    if embedding.is_empty() {
        return Err(QaError::EmbeddingFailed("empty embedding vector".to_string()));
    }
    Ok(DocumentRecord {
        id: listing.id.clone(),
        name: listing.name.clone(),
        content,
        embedding,
    })
}

/// Holds the in-flight flag for the duration of a rebuild.
struct RebuildGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RebuildGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QaError::RebuildInProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::InMemorySource;
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[tokio::test]
    async fn test_rebuild_counts_and_generation() {
        let index = DocumentIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.generation(), 0);

        let source = InMemorySource::new()
            .with_doc("a", "Alpha", "alpha body")
            .with_doc("b", "Beta", "beta body");
        let report = index.rebuild(&source, &LengthEmbedder).await.unwrap();

        assert_eq!(report.count, 2);
        assert_eq!(report.generation, 1);
        assert!(report.skipped.is_empty());

        let snap = index.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.built_at.is_some());
        assert_eq!(snap.records()[0].name, "Alpha");
        assert_eq!(
            snap.records()[0].embedding[0],
            "Alpha\nalpha body".len() as f32
        );
    }

    #[tokio::test]
    async fn test_rebuild_ignores_non_documents() {
        let index = DocumentIndex::new();
        let source = InMemorySource::new()
            .with_doc("a", "Alpha", "alpha body")
            .with_file("p", "Slides.pdf", "application/pdf");
        let report = index.rebuild(&source, &LengthEmbedder).await.unwrap();
        assert_eq!(report.count, 1);
    }

    #[tokio::test]
    async fn test_failing_document_is_skipped() {
        let index = DocumentIndex::new();
        let source = InMemorySource::new()
            .with_doc("a", "Alpha", "alpha body")
            .with_failing_doc("x", "Broken")
            .with_doc("b", "Beta", "beta body");
        let report = index.rebuild(&source, &LengthEmbedder).await.unwrap();

        assert_eq!(report.count, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "x");
    }

    #[tokio::test]
    async fn test_listing_failure_keeps_previous_generation() {
        let index = DocumentIndex::new();
        let source = InMemorySource::new().with_doc("a", "Alpha", "alpha body");
        index.rebuild(&source, &LengthEmbedder).await.unwrap();

        source.set_listing_down(true);
        let err = index.rebuild(&source, &LengthEmbedder).await.unwrap_err();
        assert!(matches!(err, QaError::SourceUnavailable(_)));

        assert_eq!(index.len(), 1);
        assert_eq!(index.generation(), 1);
        assert!(!index.is_rebuilding());
    }

    #[test]
    fn test_guard_rejects_second_holder_and_releases_on_drop() {
        let flag = AtomicBool::new(false);
        let first = RebuildGuard::acquire(&flag).unwrap();
        assert!(matches!(
            RebuildGuard::acquire(&flag),
            Err(QaError::RebuildInProgress)
        ));
        drop(first);
        assert!(RebuildGuard::acquire(&flag).is_ok());
    }
}
