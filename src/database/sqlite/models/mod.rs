#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::recommend::RelatedItem;

/// A document as stored in the content database. Tags are kept in their
/// serialized JSON form; use [`Document::tag_list`] to decode them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub tags: String,
    pub starred: bool,
    pub published: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Document {
    /// Tags decoded from their stored JSON form. Malformed JSON yields an
    /// empty list rather than failing the read path.
    #[inline]
    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewDocument {
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub tags: Vec<String>,
    pub starred: bool,
    pub published: bool,
}

/// Persisted recommendation list for one document. Items are stored as a
/// JSON array; `created_at` marks the first computation and survives
/// subsequent refreshes, while `updated_at` tracks the latest one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RecommendationRecord {
    pub id: i64,
    pub slug: String,
    pub items: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl RecommendationRecord {
    #[inline]
    pub fn item_list(&self) -> Vec<RelatedItem> {
        serde_json::from_str(&self.items).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStats {
    pub total_documents: i64,
    pub published_documents: i64,
    pub starred_documents: i64,
    pub recommendation_rows: i64,
}
