// Corpus reconciliation
// Pure set arithmetic between content-store keys and index keys

use std::collections::HashSet;
use tracing::debug;

/// Differences between the published corpus and the vector index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Number of published documents considered
    pub content_keys: usize,
    /// Number of indexed vectors considered
    pub index_keys: usize,
    /// Keys published but absent from the index; these need embedding
    pub new: Vec<String>,
    /// Keys indexed with no published document behind them. Reported only:
    /// the diff cannot tell a deleted document from a temporarily
    /// unpublished one, so deletion stays a caller decision.
    pub orphaned: Vec<String>,
}

impl ReconcileReport {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.new.is_empty() && self.orphaned.is_empty()
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.new.len() + self.orphaned.len()
    }

    /// One-line summary for logs and status output.
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent() {
            format!(
                "Corpus and index agree: {} documents, {} vectors",
                self.content_keys, self.index_keys
            )
        } else {
            format!(
                "Drift detected: {} documents missing from the index, {} orphaned vectors",
                self.new.len(),
                self.orphaned.len()
            )
        }
    }
}

/// Diff the published corpus against the index.
///
/// `new` is `content − index`, `orphaned` is `index − content`. Both lists
/// come back sorted so passes walk keys in a stable order.
#[inline]
pub fn diff(content_keys: &[String], index_keys: &[String]) -> ReconcileReport {
    let content_set: HashSet<&str> = content_keys.iter().map(String::as_str).collect();
    let index_set: HashSet<&str> = index_keys.iter().map(String::as_str).collect();

    let mut new: Vec<String> = content_set
        .difference(&index_set)
        .map(|s| (*s).to_string())
        .collect();
    new.sort();

    let mut orphaned: Vec<String> = index_set
        .difference(&content_set)
        .map(|s| (*s).to_string())
        .collect();
    orphaned.sort();

    debug!(
        "Reconciled {} content keys against {} index keys: {} new, {} orphaned",
        content_set.len(),
        index_set.len(),
        new.len(),
        orphaned.len()
    );

    ReconcileReport {
        content_keys: content_set.len(),
        index_keys: index_set.len(),
        new,
        orphaned,
    }
}

/// Treat every content key as new. Full rebuilds use this after clearing
/// the index.
#[inline]
pub fn force(content_keys: &[String]) -> ReconcileReport {
    let mut new = content_keys.to_vec();
    new.sort();
    new.dedup();

    ReconcileReport {
        content_keys: new.len(),
        index_keys: 0,
        new,
        orphaned: Vec::new(),
    }
}
