// Sync orchestration module
// Drives reconcile -> normalize -> embed -> index -> recompute -> persist


pub mod reconcile;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::lancedb::vector_store::VectorStore;
use crate::database::lancedb::{IndexEntry, SearchMatch};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::Document;
use crate::embeddings::{EmbeddingTask, GeminiClient, is_zero_vector};
use crate::normalize::normalize;
use crate::recommend::RecommendationEngine;
use crate::{RecsyncError, Result};

pub use reconcile::ReconcileReport;

/// Phases of a sync pass.
///
/// `Recomputing` is unreachable until `Indexing` has finished for every
/// targeted key; that barrier is what makes neighbor queries see the pass's
/// own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Reconciling,
    Embedding,
    Indexing,
    Recomputing,
    Persisting,
    Done,
    Failed,
}

impl SyncState {
    /// Legal phase transitions. `Failed` is reachable from any live state.
    #[inline]
    pub fn can_transition(self, next: Self) -> bool {
        use SyncState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, Reconciling)
                | (Idle, Embedding)
                | (Reconciling, Embedding)
                | (Embedding, Indexing)
                | (Indexing, Recomputing)
                | (Recomputing, Persisting)
                | (Persisting, Done)
        )
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Tracks the phase of one pass and enforces the transition table.
struct PassTracker {
    state: SyncState,
}

impl PassTracker {
    fn new() -> Self {
        Self {
            state: SyncState::Idle,
        }
    }

    fn advance(&mut self, next: SyncState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal sync transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Sync pass: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(SyncState::Failed);
        }
    }

    fn state(&self) -> SyncState {
        self.state
    }
}

/// One key that could not be carried through a pass, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub reason: String,
}

/// Outcome of one sync pass. Failures accumulate per key instead of
/// aborting the pass; only store-level errors do that.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub state: SyncState,
    /// Keys newly embedded and indexed in this pass
    pub succeeded: Vec<String>,
    /// Keys that failed during embedding or recomputation
    pub failed: Vec<KeyFailure>,
    /// Indexed keys with no published document behind them
    pub orphaned: Vec<String>,
    /// Recommendation rows written
    pub recommendations_written: usize,
}

impl PassSummary {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.state == SyncState::Done && self.failed.is_empty()
    }
}

/// Corpus and index counters for the status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStats {
    pub corpus_documents: usize,
    pub indexed_vectors: usize,
    pub recommendation_rows: usize,
    pub index_dimension: usize,
    /// Published documents with no vector in the index
    pub missing_keys: Vec<String>,
}

/// The sync orchestrator.
///
/// One engine owns the store handles; callers serialize passes (the serving
/// layer keeps the engine behind an async mutex). Repeated invocation is
/// the recovery mechanism: every write is an idempotent upsert, so an
/// interrupted pass is finished by running it again.
pub struct SyncEngine {
    config: Config,
    database: Database,
    index: VectorStore,
    embedder: GeminiClient,
}

impl SyncEngine {
    /// Build an engine from already-constructed collaborators.
    #[inline]
    pub fn new(
        config: Config,
        database: Database,
        index: VectorStore,
        embedder: GeminiClient,
    ) -> Self {
        Self {
            config,
            database,
            index,
            embedder,
        }
    }

    /// Open the stores under the configured base directory and build the
    /// provider client.
    #[inline]
    pub async fn initialize(config: Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir()).await?;
        let index = VectorStore::new(&config).await?;
        let embedder = GeminiClient::new(&config.embedding)?;

        Ok(Self::new(config, database, index, embedder))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn index(&self) -> &VectorStore {
        &self.index
    }

    #[inline]
    pub fn embedder(&self) -> &GeminiClient {
        &self.embedder
    }

    /// Embed whatever is published but not yet indexed, then refresh every
    /// stored recommendation list.
    ///
    /// The refresh runs even when nothing new was embedded: recomputation
    /// is a pure function of index contents, so an unchanged corpus
    /// reproduces the same table.
    #[inline]
    pub async fn run_incremental(&self) -> Result<PassSummary> {
        let mut tracker = PassTracker::new();
        match self.incremental_inner(&mut tracker).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracker.fail();
                error!("Incremental sync failed: {}", e);
                Err(e)
            }
        }
    }

    /// Sync one document end to end. `whole_corpus` refreshes every stored
    /// recommendation list instead of just this document's, for when a new
    /// neighbor may outrank existing ones elsewhere.
    #[inline]
    pub async fn sync_document(&self, slug: &str, whole_corpus: bool) -> Result<PassSummary> {
        let mut tracker = PassTracker::new();
        match self.single_inner(&mut tracker, slug, whole_corpus).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracker.fail();
                error!("Single-document sync failed for {}: {}", slug, e);
                Err(e)
            }
        }
    }

    /// Clear the index and re-embed the entire published corpus.
    #[inline]
    pub async fn run_full_rebuild(&self) -> Result<PassSummary> {
        let mut tracker = PassTracker::new();
        match self.rebuild_inner(&mut tracker).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracker.fail();
                error!("Full rebuild failed: {}", e);
                Err(e)
            }
        }
    }

    /// Re-embed documents whose vectors are missing or zeroed out, then
    /// refresh the whole table.
    #[inline]
    pub async fn run_repair(&self) -> Result<PassSummary> {
        let mut tracker = PassTracker::new();
        match self.repair_inner(&mut tracker).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracker.fail();
                error!("Repair pass failed: {}", e);
                Err(e)
            }
        }
    }

    async fn incremental_inner(&self, tracker: &mut PassTracker) -> Result<PassSummary> {
        info!("Starting incremental sync pass");
        tracker.advance(SyncState::Reconciling);

        let documents = self.database.list_published_documents().await?;
        let content_keys: Vec<String> = documents.iter().map(|d| d.slug.clone()).collect();
        let index_keys = self.index.list_slugs().await?;

        let report = reconcile::diff(&content_keys, &index_keys);
        info!("{}", report.summary());

        self.execute_pass(tracker, &documents, report.new, report.orphaned)
            .await
    }

    async fn single_inner(
        &self,
        tracker: &mut PassTracker,
        slug: &str,
        whole_corpus: bool,
    ) -> Result<PassSummary> {
        info!("Syncing single document: {}", slug);

        let document = self.database.get_document(slug).await?.ok_or_else(|| {
            RecsyncError::NotFound(format!("document '{}' does not exist", slug))
        })?;
        if !document.published {
            return Err(RecsyncError::InvalidInput(format!(
                "document '{}' is not published",
                slug
            )));
        }

        tracker.advance(SyncState::Embedding);
        let entry = self.prepare_entry(&document)?;

        tracker.advance(SyncState::Indexing);
        self.upsert_with_retry(vec![entry]).await?;

        // Give the index a moment to absorb the write before querying it
        let settle = Duration::from_millis(self.config.sync.settle_delay_ms);
        if !settle.is_zero() {
            sleep(settle).await;
        }

        let recompute_keys = if whole_corpus {
            self.recomputable_keys().await?
        } else {
            vec![slug.to_string()]
        };

        let mut failed = Vec::new();
        let written = self
            .recompute_and_persist(tracker, &recompute_keys, &mut failed)
            .await?;

        tracker.advance(SyncState::Done);
        info!("Single-document sync finished for {}", slug);
        Ok(PassSummary {
            state: tracker.state(),
            succeeded: vec![slug.to_string()],
            failed,
            orphaned: Vec::new(),
            recommendations_written: written,
        })
    }

    async fn rebuild_inner(&self, tracker: &mut PassTracker) -> Result<PassSummary> {
        info!("Starting full index rebuild");
        tracker.advance(SyncState::Reconciling);

        let documents = self.database.list_published_documents().await?;
        let content_keys: Vec<String> = documents.iter().map(|d| d.slug.clone()).collect();

        self.index.delete_all().await?;
        let report = reconcile::force(&content_keys);
        info!("Rebuilding {} documents from scratch", report.new.len());

        let summary = self
            .execute_pass(tracker, &documents, report.new, report.orphaned)
            .await?;

        // Maintenance after heavy churn
        if let Err(e) = self.index.optimize().await {
            warn!("Failed to optimize vector index after rebuild: {}", e);
        }
        if let Err(e) = self.database.optimize().await {
            warn!("Failed to optimize content database after rebuild: {}", e);
        }

        Ok(summary)
    }

    async fn repair_inner(&self, tracker: &mut PassTracker) -> Result<PassSummary> {
        info!("Starting repair pass");
        tracker.advance(SyncState::Reconciling);

        let documents = self.database.list_published_documents().await?;
        let content_keys: Vec<String> = documents.iter().map(|d| d.slug.clone()).collect();
        let entries = self.index.list_entries().await?;
        let index_keys: Vec<String> = entries.iter().map(|e| e.slug.clone()).collect();

        let report = reconcile::diff(&content_keys, &index_keys);

        // Zero vectors are the sentinel older pipelines wrote when a
        // provider call failed mid-batch; they rank nonsensically and need
        // a real embedding.
        let content_set: HashSet<&str> = content_keys.iter().map(String::as_str).collect();
        let zero_keys: Vec<String> = entries
            .iter()
            .filter(|entry| {
                is_zero_vector(&entry.vector) && content_set.contains(entry.slug.as_str())
            })
            .map(|entry| entry.slug.clone())
            .collect();
        if !zero_keys.is_empty() {
            warn!(
                "Found {} zero-vector entries needing re-embedding",
                zero_keys.len()
            );
        }

        let mut work = report.new;
        work.extend(zero_keys);
        work.sort();
        work.dedup();
        info!("Repairing {} documents", work.len());

        self.execute_pass(tracker, &documents, work, report.orphaned)
            .await
    }

    /// The shared embed -> index -> recompute -> persist spine.
    async fn execute_pass(
        &self,
        tracker: &mut PassTracker,
        documents: &[Document],
        work_keys: Vec<String>,
        orphaned: Vec<String>,
    ) -> Result<PassSummary> {
        let by_slug: HashMap<&str, &Document> =
            documents.iter().map(|d| (d.slug.as_str(), d)).collect();

        tracker.advance(SyncState::Embedding);
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut entries = Vec::new();
        let pacing = Duration::from_millis(self.config.embedding.pacing_ms);

        for (position, key) in work_keys.iter().enumerate() {
            let Some(document) = by_slug.get(key.as_str()) else {
                // The listing and the diff ran moments apart; a key can
                // vanish in between
                failed.push(KeyFailure {
                    key: key.clone(),
                    reason: "document disappeared during the pass".to_string(),
                });
                continue;
            };

            match self.prepare_entry(document) {
                Ok(entry) => {
                    entries.push(entry);
                    succeeded.push(key.clone());
                }
                Err(e) if is_pass_fatal(&e) => return Err(e),
                Err(e) => {
                    warn!("Embedding failed for {}: {}", key, e);
                    failed.push(KeyFailure {
                        key: key.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            if position + 1 < work_keys.len() && !pacing.is_zero() {
                sleep(pacing).await;
            }
        }

        tracker.advance(SyncState::Indexing);
        self.upsert_with_retry(entries).await?;

        let recompute_keys = self.recomputable_keys().await?;
        let written = self
            .recompute_and_persist(tracker, &recompute_keys, &mut failed)
            .await?;

        tracker.advance(SyncState::Done);
        info!(
            "Pass complete: {} embedded, {} failed, {} recommendation rows written",
            succeeded.len(),
            failed.len(),
            written
        );
        Ok(PassSummary {
            state: tracker.state(),
            succeeded,
            failed,
            orphaned,
            recommendations_written: written,
        })
    }

    /// Normalize, embed, and package one document for the index.
    fn prepare_entry(&self, document: &Document) -> Result<IndexEntry> {
        let processed = normalize(document, &self.config.normalize)?;
        let vector = self
            .embedder
            .embed(&processed.text, EmbeddingTask::Document)?;
        if is_zero_vector(&vector) {
            return Err(RecsyncError::ProviderUnavailable(format!(
                "provider returned a zero vector for '{}'",
                document.slug
            )));
        }

        Ok(IndexEntry::new(&processed, vector, &self.config.index))
    }

    /// Index writes are idempotent, so one retry after a transient failure
    /// is always safe.
    async fn upsert_with_retry(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        match self.index.upsert_batch(entries.clone()).await {
            Ok(written) => Ok(written),
            Err(first)
                if first.is_retryable()
                    || matches!(first, RecsyncError::PartialBatchFailure { .. }) =>
            {
                warn!("Batch upsert failed, retrying once: {}", first);
                self.index.upsert_batch(entries).await
            }
            Err(e) => Err(e),
        }
    }

    /// Keys eligible for recommendation refresh: published and indexed.
    async fn recomputable_keys(&self) -> Result<Vec<String>> {
        let content = self.database.list_published_slugs().await?;
        let indexed: HashSet<String> = self.index.list_slugs().await?.into_iter().collect();

        Ok(content
            .into_iter()
            .filter(|slug| indexed.contains(slug))
            .collect())
    }

    async fn recompute_and_persist(
        &self,
        tracker: &mut PassTracker,
        keys: &[String],
        failed: &mut Vec<KeyFailure>,
    ) -> Result<usize> {
        tracker.advance(SyncState::Recomputing);
        let engine = RecommendationEngine::new(&self.index, self.config.sync.top_k);
        let report = engine.recommend_all(keys).await?;
        for (key, reason) in report.failed {
            failed.push(KeyFailure { key, reason });
        }

        tracker.advance(SyncState::Persisting);
        let mut written = 0usize;
        for (key, items) in &report.computed {
            self.database.upsert_recommendations(key, items).await?;
            written += 1;
        }

        Ok(written)
    }

    /// Corpus, index, and drift counters for status displays.
    #[inline]
    pub async fn stats(&self) -> Result<SyncStats> {
        let content_keys = self.database.list_published_slugs().await?;
        let index_keys = self.index.list_slugs().await?;
        let index_stats = self.index.stats().await?;
        let content_stats = self.database.content_stats().await?;
        let report = reconcile::diff(&content_keys, &index_keys);

        Ok(SyncStats {
            corpus_documents: content_keys.len(),
            indexed_vectors: index_stats.total_vectors,
            recommendation_rows: content_stats.recommendation_rows as usize,
            index_dimension: index_stats.dimension,
            missing_keys: report.new,
        })
    }

    /// Semantic search over the indexed corpus with a free-text query.
    #[inline]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchMatch>> {
        if query.trim().is_empty() {
            return Err(RecsyncError::InvalidInput(
                "search query is empty".to_string(),
            ));
        }

        let vector = self.embedder.embed(query, EmbeddingTask::Query)?;
        self.index.search_similar(&vector, limit).await
    }
}

/// Store-level failures abort the pass; anything else is accumulated
/// against the key it happened on.
fn is_pass_fatal(error: &RecsyncError) -> bool {
    matches!(
        error,
        RecsyncError::DimensionMismatch { .. }
            | RecsyncError::IndexUnavailable(_)
            | RecsyncError::Database(_)
            | RecsyncError::PartialBatchFailure { .. }
    )
}
