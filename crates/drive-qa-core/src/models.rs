//! Core data types.
//!
//! - [`DocumentRecord`]: one indexed document with its embedding.
//! - [`DocumentListing`]: a row from the source's file listing.
//! - [`ScoredDocument`]: a record paired with its similarity to a query.
//! - [`CreatedDocument`]: the result of creating a document at the source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Content type of documents the index accepts.
pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

/// An indexed document. Immutable once stored in a generation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    /// Source-provided identifier, unique within a generation.
    pub id: String,
    /// Display name (document title).
    pub name: String,
    /// Plain-text content.
    pub content: String,
    /// Embedding of `name + "\n" + content`.
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
}

impl DocumentRecord {
    /// The text an index embeds for this document.
    pub fn embedding_input(name: &str, content: &str) -> String {
        format!("{}\n{}", name, content)
    }
}

/// A file as reported by the document source's listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentListing {
    pub id: String,
    pub name: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
}

impl DocumentListing {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content_type: content_type.into(),
            created_time: None,
            modified_time: None,
        }
    }
}

/// A record scored against a query. Produced per request.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
    pub record: Arc<DocumentRecord>,
}

/// Result of creating a document at the source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedDocument {
    pub id: String,
    pub title: String,
    /// Browser URL for editing the new document.
    pub url: String,
}

/// Filter for document listings.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Maximum number of files to return.
    pub page_size: Option<u32>,
    /// Only return files of this content type.
    pub content_type: Option<String>,
}
