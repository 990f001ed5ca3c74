//! Document source abstraction.
//!
//! The [`DocumentSource`] trait is everything the index and the document
//! pass-through operations need from a remote document store: list files,
//! fetch a document's plain text, and create a new document.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CreatedDocument, DocumentListing, ListFilter};

/// Remote store of documents.
///
/// # Errors
///
/// - [`list`](DocumentSource::list) and [`create`](DocumentSource::create)
///   fail with [`QaError::SourceUnavailable`](crate::QaError::SourceUnavailable).
/// - [`get_content`](DocumentSource::get_content) fails with
///   [`QaError::DocumentUnavailable`](crate::QaError::DocumentUnavailable);
///   the index skips such documents during a rebuild.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// List files matching `filter`.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<DocumentListing>>;

    /// Fetch the plain-text content of one document.
    async fn get_content(&self, id: &str) -> Result<String>;

    /// Create a document with the given title and initial text.
    async fn create(&self, title: &str, content: &str) -> Result<CreatedDocument>;
}
