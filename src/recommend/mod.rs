
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::lancedb::vector_store::VectorStore;
use crate::{RecsyncError, Result};

/// One entry in a document's persisted recommendation list. Carries enough
/// display metadata to render a related-content panel without another lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedItem {
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub starred: bool,
    pub score: f32,
}

/// Related items for a set of documents, with the keys that could not be
/// computed. Failures carry the reason text they were skipped with.
#[derive(Debug, Default)]
pub struct RecommendReport {
    pub computed: Vec<(String, Vec<RelatedItem>)>,
    pub failed: Vec<(String, String)>,
}

/// Computes ranked related items for documents already present in the vector
/// index. Borrows the store; one engine serves a whole recompute pass.
pub struct RecommendationEngine<'a> {
    store: &'a VectorStore,
    top_k: usize,
}

impl<'a> RecommendationEngine<'a> {
    #[inline]
    pub fn new(store: &'a VectorStore, top_k: usize) -> Self {
        Self { store, top_k }
    }

    /// The ranked neighbors of one document, excluding the document itself.
    ///
    /// Returns `NotFound` when the document has no indexed vector. A corpus
    /// with no other documents yields an empty list, which is still a valid
    /// result to persist.
    #[inline]
    pub async fn recommend_for(&self, slug: &str) -> Result<Vec<RelatedItem>> {
        let Some(entry) = self.store.fetch(slug).await? else {
            return Err(RecsyncError::NotFound(format!(
                "no vector indexed for '{slug}'"
            )));
        };

        // Ask for one extra neighbor since the document itself comes back
        // as its own closest match.
        let matches = self
            .store
            .search_similar(&entry.vector, self.top_k + 1)
            .await?;

        let related: Vec<RelatedItem> = matches
            .into_iter()
            .filter(|m| m.slug != slug)
            .take(self.top_k)
            .map(|m| RelatedItem {
                slug: m.slug,
                title: m.metadata.title,
                summary: m.metadata.summary,
                tags: m.metadata.tags,
                starred: m.metadata.starred,
                score: round_score(m.score),
            })
            .collect();

        debug!("Computed {} related items for {}", related.len(), slug);
        Ok(related)
    }

    /// [`recommend_for`](Self::recommend_for) applied to every key.
    ///
    /// A key without an indexed vector fails that key alone and the walk
    /// continues; store-level errors abort the whole computation, since
    /// every remaining key would hit the same wall.
    #[inline]
    pub async fn recommend_all(&self, keys: &[String]) -> Result<RecommendReport> {
        let mut report = RecommendReport::default();

        for key in keys {
            match self.recommend_for(key).await {
                Ok(items) => report.computed.push((key.clone(), items)),
                Err(e @ RecsyncError::NotFound(_)) => {
                    warn!("Recommendations unavailable for {}: {}", key, e);
                    report.failed.push((key.clone(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

/// Cosine similarity between two vectors. A zero-magnitude vector on either
/// side yields 0.0 instead of dividing by zero.
#[inline]
pub fn compute_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Scores are persisted with four decimal places; beyond that the digits are
/// float noise that churns stored rows on every recompute.
fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}
