//! In-memory [`DocumentSource`] for tests and offline runs.
//!
//! Documents live in a `Vec` behind `std::sync::RwLock`. Individual
//! documents can be marked as failing so rebuild degradation can be
//! exercised, and the whole listing can be switched off to simulate an
//! unreachable source.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{QaError, Result};
use crate::models::{CreatedDocument, DocumentListing, ListFilter, GOOGLE_DOC_MIME};

use super::DocumentSource;

struct StoredDoc {
    listing: DocumentListing,
    content: String,
    fail_content: bool,
}

/// In-memory document store.
pub struct InMemorySource {
    docs: RwLock<Vec<StoredDoc>>,
    listing_down: AtomicBool,
    next_id: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            listing_down: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Add a Google Doc with the given content.
    pub fn with_doc(self, id: &str, name: &str, content: &str) -> Self {
        self.push(DocumentListing::new(id, name, GOOGLE_DOC_MIME), content, false);
        self
    }

    /// Add a Google Doc whose content fetch always fails.
    pub fn with_failing_doc(self, id: &str, name: &str) -> Self {
        self.push(DocumentListing::new(id, name, GOOGLE_DOC_MIME), "", true);
        self
    }

    /// Add a non-document file (e.g. a PDF) that appears in listings.
    pub fn with_file(self, id: &str, name: &str, content_type: &str) -> Self {
        self.push(DocumentListing::new(id, name, content_type), "", false);
        self
    }

    /// Make subsequent `list` calls fail with `SourceUnavailable`.
    pub fn set_listing_down(&self, down: bool) {
        self.listing_down.store(down, Ordering::SeqCst);
    }

    /// Replace the content of an existing document.
    pub fn set_content(&self, id: &str, content: &str) {
        if let Ok(mut docs) = self.docs.write() {
            if let Some(doc) = docs.iter_mut().find(|d| d.listing.id == id) {
                doc.content = content.to_string();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, listing: DocumentListing, content: &str, fail_content: bool) {
        if let Ok(mut docs) = self.docs.write() {
            docs.push(StoredDoc {
                listing,
                content: content.to_string(),
                fail_content,
            });
        }
    }
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> QaError {
    QaError::SourceUnavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl DocumentSource for InMemorySource {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<DocumentListing>> {
        if self.listing_down.load(Ordering::SeqCst) {
            return Err(QaError::SourceUnavailable(
                "listing is unavailable".to_string(),
            ));
        }
        let docs = self.docs.read().map_err(|_| poisoned())?;
        let limit = filter.page_size.map(|n| n as usize).unwrap_or(usize::MAX);
        Ok(docs
            .iter()
            .filter(|d| {
                filter
                    .content_type
                    .as_deref()
                    .map_or(true, |ct| d.listing.content_type == ct)
            })
            .take(limit)
            .map(|d| d.listing.clone())
            .collect())
    }

    async fn get_content(&self, id: &str) -> Result<String> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        match docs.iter().find(|d| d.listing.id == id) {
            Some(d) if d.fail_content => Err(QaError::document_unavailable(id, "fetch failed")),
            Some(d) => Ok(d.content.clone()),
            None => Err(QaError::document_unavailable(id, "not found")),
        }
    }

    async fn create(&self, title: &str, content: &str) -> Result<CreatedDocument> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("mem-{}", n);
        self.push(
            DocumentListing::new(id.clone(), title, GOOGLE_DOC_MIME),
            content,
            false,
        );
        Ok(CreatedDocument {
            url: format!("memory://documents/{}", id),
            id,
            title: title.to_string(),
        })
    }
}
