// LanceDB vector index module
// Handles vector storage and similarity search for document embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::normalize::ProcessedDocument;

/// One indexed document: its embedding plus the metadata surfaced in
/// recommendation lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Stable document key, unique within the index
    pub slug: String,
    /// The embedding vector, sized to the configured dimension
    pub vector: Vec<f32>,
    /// Display metadata stored alongside the vector
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    /// Pairs a normalized document with its embedding, applying the
    /// configured metadata caps.
    #[inline]
    pub fn new(document: &ProcessedDocument, vector: Vec<f32>, config: &IndexConfig) -> Self {
        Self {
            slug: document.slug.clone(),
            vector,
            metadata: EntryMetadata::from_document(document, config),
        }
    }
}

/// Metadata stored next to each vector so search results can be rendered
/// without a round trip to the content database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Document title, capped at the configured length
    pub title: String,
    /// Document summary, capped at the configured length
    pub summary: String,
    /// Topic tags
    pub tags: Vec<String>,
    /// Whether the document is starred
    pub starred: bool,
    /// Last content timestamp, RFC 3339
    pub updated_at: String,
}

impl EntryMetadata {
    /// Caps title and summary to the configured lengths. Oversized values
    /// are truncated on a character boundary rather than rejected.
    #[inline]
    pub fn from_document(document: &ProcessedDocument, config: &IndexConfig) -> Self {
        Self {
            title: cap_chars(&document.title, config.title_max_chars),
            summary: cap_chars(&document.summary, config.summary_max_chars),
            tags: document.tags.clone(),
            starred: document.starred,
            updated_at: document.updated_at.clone(),
        }
    }
}

/// One similarity search hit with its cosine score.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub slug: String,
    /// Cosine similarity in [-1.0, 1.0], higher is closer
    pub score: f32,
    pub metadata: EntryMetadata,
}

/// Summary counters for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vectors: usize,
    pub dimension: usize,
    pub table_name: String,
}

fn cap_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
