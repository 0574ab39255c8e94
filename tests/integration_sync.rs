#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end sync pass tests against a mocked embedding provider.
// The provider is blocking, so every test runs on a multi-thread runtime
// to keep the mock server responsive during embedding calls.

use std::path::Path;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recsync::RecsyncError;
use recsync::config::{Config, EmbeddingConfig, SyncConfig};
use recsync::database::lancedb::{EntryMetadata, IndexEntry};
use recsync::database::sqlite::models::NewDocument;
use recsync::normalize::NormalizeConfig;
use recsync::sync::SyncEngine;

const DIMENSION: usize = 64;
const TEST_MODEL: &str = "gemini-embedding-001";

fn embed_path() -> String {
    format!("/v1beta/models/{}:embedContent", TEST_MODEL)
}

/// A unit vector pointing along one axis.
fn axis_vector(axis: usize) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    vector[axis] = 1.0;
    vector
}

/// A unit vector with the given cosine similarity to `axis_vector(toward)`,
/// leaning into the `off` axis for the remainder.
fn leaning_vector(toward: usize, off: usize, cosine: f32) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    vector[toward] = cosine;
    vector[off] = (1.0 - cosine * cosine).sqrt();
    vector
}

fn test_config(server: &MockServer, base_dir: &Path) -> Config {
    let address = server.address();
    Config {
        embedding: EmbeddingConfig {
            protocol: "http".to_string(),
            host: address.ip().to_string(),
            port: address.port(),
            model: TEST_MODEL.to_string(),
            api_key: "test-key".to_string(),
            dimension: DIMENSION as u32,
            max_input_chars: 25_000,
            pacing_ms: 0,
        },
        sync: SyncConfig {
            top_k: 3,
            settle_delay_ms: 0,
        },
        normalize: NormalizeConfig::default(),
        base_dir: base_dir.to_path_buf(),
        ..Config::default()
    }
}

/// Serve a fixed vector for any embedding request whose body contains the
/// needle. Each document gets a unique title so the needles never overlap.
async fn mount_embedding(server: &MockServer, needle: &str, vector: &[f32]) {
    Mock::given(method("POST"))
        .and(path(embed_path()))
        .and(body_string_contains(needle))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": { "values": vector }
        })))
        .mount(server)
        .await;
}

/// Reject matching embedding requests with a client error, which the
/// provider client does not retry.
async fn mount_rejection(server: &MockServer, needle: &str) {
    Mock::given(method("POST"))
        .and(path(embed_path()))
        .and(body_string_contains(needle))
        .respond_with(ResponseTemplate::new(400))
        .mount(server)
        .await;
}

fn published_post(slug: &str, title: &str, body: &str, tags: &[&str]) -> NewDocument {
    NewDocument {
        slug: slug.to_string(),
        title: title.to_string(),
        summary: format!("Notes about {}", title),
        body: body.to_string(),
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
        starred: false,
        published: true,
    }
}

async fn create_engine(server: &MockServer, temp_dir: &TempDir) -> SyncEngine {
    let config = test_config(server, temp_dir.path());
    SyncEngine::initialize(config)
        .await
        .expect("engine should initialize")
}

/// Three posts: two closely related systems posts and one unrelated one.
async fn seed_corpus(server: &MockServer, engine: &SyncEngine) {
    let posts = vec![
        published_post(
            "ownership-basics",
            "Ownership fundamentals",
            "How move semantics keep heap data single-owner.",
            &["systems", "memory"],
        ),
        published_post(
            "borrow-checker",
            "Borrow checker patterns",
            "Shared and exclusive references without data races.",
            &["systems", "memory"],
        ),
        published_post(
            "weeknight-pasta",
            "Weeknight pasta sauces",
            "Five sauces you can finish before the water boils.",
            &["cooking"],
        ),
    ];

    for post in posts {
        engine
            .database()
            .upsert_document(post)
            .await
            .expect("should store post");
    }

    mount_embedding(server, "Ownership fundamentals", &axis_vector(0)).await;
    mount_embedding(server, "Borrow checker patterns", &leaning_vector(0, 1, 0.9)).await;
    mount_embedding(server, "Weeknight pasta sauces", &axis_vector(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn incremental_sync_embeds_ranks_and_persists() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    let summary = engine.run_incremental().await.expect("sync should succeed");

    assert!(summary.is_clean(), "summary should be clean: {:?}", summary);
    assert_eq!(
        summary.succeeded,
        vec!["borrow-checker", "ownership-basics", "weeknight-pasta"]
    );
    assert!(summary.failed.is_empty());
    assert!(summary.orphaned.is_empty());
    assert_eq!(summary.recommendations_written, 3);

    let indexed = engine.index().count().await.expect("should count");
    assert_eq!(indexed, 3);

    // The related systems post must outrank the unrelated one
    let record = engine
        .database()
        .get_recommendations("ownership-basics")
        .await
        .expect("read should succeed")
        .expect("recommendations should exist");
    let items = record.item_list();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].slug, "borrow-checker");
    assert!(items.iter().all(|item| item.slug != "ownership-basics"));
    for window in items.windows(2) {
        assert!(window[0].score >= window[1].score, "scores must descend");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_sync_embeds_only_new_documents() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    engine
        .run_incremental()
        .await
        .expect("first sync should succeed");

    engine
        .database()
        .upsert_document(published_post(
            "lifetimes-deep-dive",
            "Lifetime annotations explained",
            "Where elision stops and explicit lifetimes begin.",
            &["systems", "memory"],
        ))
        .await
        .expect("should store post");
    mount_embedding(
        &server,
        "Lifetime annotations explained",
        &leaning_vector(0, 1, 0.95),
    )
    .await;

    let summary = engine
        .run_incremental()
        .await
        .expect("second sync should succeed");

    assert_eq!(summary.succeeded, vec!["lifetimes-deep-dive"]);
    assert!(summary.failed.is_empty());
    // Every indexed document gets a refreshed list, not just the new one
    assert_eq!(summary.recommendations_written, 4);
    assert_eq!(engine.index().count().await.expect("should count"), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_sync_is_idempotent() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    engine
        .run_incremental()
        .await
        .expect("first sync should succeed");
    let items_before = engine
        .database()
        .get_recommendations("borrow-checker")
        .await
        .expect("read should succeed")
        .expect("recommendations should exist")
        .item_list();

    let summary = engine
        .run_incremental()
        .await
        .expect("second sync should succeed");

    assert!(summary.is_clean());
    assert!(summary.succeeded.is_empty(), "nothing new to embed");
    assert_eq!(summary.recommendations_written, 3);

    let items_after = engine
        .database()
        .get_recommendations("borrow-checker")
        .await
        .expect("read should succeed")
        .expect("recommendations should exist")
        .item_list();
    assert_eq!(items_before, items_after);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_rejection_splits_the_summary() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;

    for post in [
        published_post("good-one", "Allocator design notes", "Arenas and pools.", &[]),
        published_post("bad-one", "Unfinished draft thoughts", "Scraps.", &[]),
        published_post("good-two", "Scheduler internals", "Work stealing queues.", &[]),
    ] {
        engine
            .database()
            .upsert_document(post)
            .await
            .expect("should store post");
    }
    mount_embedding(&server, "Allocator design notes", &axis_vector(0)).await;
    mount_rejection(&server, "Unfinished draft thoughts").await;
    mount_embedding(&server, "Scheduler internals", &axis_vector(1)).await;

    let summary = engine.run_incremental().await.expect("pass should finish");

    assert!(!summary.is_clean());
    assert_eq!(summary.succeeded, vec!["good-one", "good-two"]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].key, "bad-one");
    assert!(!summary.failed[0].reason.is_empty());

    // The failed document must not reach the index
    let entry = engine
        .index()
        .fetch("bad-one")
        .await
        .expect("fetch should succeed");
    assert!(entry.is_none());
    assert_eq!(summary.recommendations_written, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_vector_response_fails_the_key() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;

    for post in [
        published_post("healthy", "Signal handling guide", "Masks and handlers.", &[]),
        published_post("degenerate", "Null result essay", "Nothing embeds here.", &[]),
    ] {
        engine
            .database()
            .upsert_document(post)
            .await
            .expect("should store post");
    }
    mount_embedding(&server, "Signal handling guide", &axis_vector(0)).await;
    mount_embedding(&server, "Null result essay", &[0.0; DIMENSION]).await;

    let summary = engine.run_incremental().await.expect("pass should finish");

    assert_eq!(summary.succeeded, vec!["healthy"]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].key, "degenerate");
    assert!(summary.failed[0].reason.contains("zero vector"));
    assert!(
        engine
            .index()
            .fetch("degenerate")
            .await
            .expect("fetch should succeed")
            .is_none()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_post_sync_scopes_the_recompute() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    engine
        .run_incremental()
        .await
        .expect("initial sync should succeed");

    engine
        .database()
        .upsert_document(published_post(
            "lifetimes-deep-dive",
            "Lifetime annotations explained",
            "Where elision stops and explicit lifetimes begin.",
            &["systems", "memory"],
        ))
        .await
        .expect("should store post");
    mount_embedding(
        &server,
        "Lifetime annotations explained",
        &leaning_vector(0, 1, 0.95),
    )
    .await;

    // Default scope refreshes only the synced post's list
    let summary = engine
        .sync_document("lifetimes-deep-dive", false)
        .await
        .expect("single sync should succeed");
    assert_eq!(summary.succeeded, vec!["lifetimes-deep-dive"]);
    assert_eq!(summary.recommendations_written, 1);

    let stale = engine
        .database()
        .get_recommendations("ownership-basics")
        .await
        .expect("read should succeed")
        .expect("recommendations should exist")
        .item_list();
    assert!(
        stale.iter().all(|item| item.slug != "lifetimes-deep-dive"),
        "other lists stay untouched without the corpus flag"
    );

    // The corpus flag refreshes every stored list
    let summary = engine
        .sync_document("lifetimes-deep-dive", true)
        .await
        .expect("corpus sync should succeed");
    assert_eq!(summary.recommendations_written, 4);

    let refreshed = engine
        .database()
        .get_recommendations("ownership-basics")
        .await
        .expect("read should succeed")
        .expect("recommendations should exist")
        .item_list();
    assert_eq!(refreshed[0].slug, "lifetimes-deep-dive");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_post_sync_rejects_unpublished() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;

    let mut draft = published_post("drafty", "Draft thoughts", "Not ready.", &[]);
    draft.published = false;
    engine
        .database()
        .upsert_document(draft)
        .await
        .expect("should store post");

    let err = engine
        .sync_document("drafty", false)
        .await
        .expect_err("unpublished post must be rejected");
    assert!(matches!(err, RecsyncError::InvalidInput(_)));

    let err = engine
        .sync_document("no-such-post", false)
        .await
        .expect_err("missing post must be rejected");
    assert!(matches!(err, RecsyncError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rebuild_reembeds_everything_and_drops_orphans() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    engine
        .run_incremental()
        .await
        .expect("initial sync should succeed");

    // Plant a vector with no published post behind it
    engine
        .index()
        .upsert(IndexEntry {
            slug: "ghost-post".to_string(),
            vector: axis_vector(3),
            metadata: EntryMetadata {
                title: "Ghost".to_string(),
                summary: String::new(),
                tags: vec![],
                starred: false,
                updated_at: "2024-01-01T00:00:00+00:00".to_string(),
            },
        })
        .await
        .expect("should plant orphan");
    assert_eq!(engine.index().count().await.expect("should count"), 4);

    let summary = engine
        .run_full_rebuild()
        .await
        .expect("rebuild should succeed");

    assert!(summary.is_clean());
    assert_eq!(summary.succeeded.len(), 3);
    assert_eq!(engine.index().count().await.expect("should count"), 3);
    assert!(
        engine
            .index()
            .fetch("ghost-post")
            .await
            .expect("fetch should succeed")
            .is_none(),
        "rebuild must drop vectors without published posts"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn incremental_sync_reports_orphans_without_deleting() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    engine
        .run_incremental()
        .await
        .expect("initial sync should succeed");

    engine
        .index()
        .upsert(IndexEntry {
            slug: "ghost-post".to_string(),
            vector: axis_vector(3),
            metadata: EntryMetadata {
                title: "Ghost".to_string(),
                summary: String::new(),
                tags: vec![],
                starred: false,
                updated_at: "2024-01-01T00:00:00+00:00".to_string(),
            },
        })
        .await
        .expect("should plant orphan");

    let summary = engine.run_incremental().await.expect("sync should succeed");

    assert_eq!(summary.orphaned, vec!["ghost-post"]);
    assert!(
        engine
            .index()
            .fetch("ghost-post")
            .await
            .expect("fetch should succeed")
            .is_some(),
        "incremental sync reports orphans but never deletes them"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repair_reembeds_zeroed_vectors() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    engine
        .run_incremental()
        .await
        .expect("initial sync should succeed");

    // Overwrite one entry with the zero sentinel an interrupted pipeline
    // would leave behind
    engine
        .index()
        .upsert(IndexEntry {
            slug: "borrow-checker".to_string(),
            vector: vec![0.0; DIMENSION],
            metadata: EntryMetadata {
                title: "Borrow checker patterns".to_string(),
                summary: String::new(),
                tags: vec![],
                starred: false,
                updated_at: "2024-01-01T00:00:00+00:00".to_string(),
            },
        })
        .await
        .expect("should zero the entry");

    let summary = engine.run_repair().await.expect("repair should succeed");

    assert!(summary.is_clean());
    assert_eq!(summary.succeeded, vec!["borrow-checker"]);

    let repaired = engine
        .index()
        .fetch("borrow-checker")
        .await
        .expect("fetch should succeed")
        .expect("entry should exist");
    assert!(
        repaired.vector.iter().any(|v| *v != 0.0),
        "repair must replace the zero vector with a real embedding"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_ranks_matches_by_meaning() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    engine
        .run_incremental()
        .await
        .expect("initial sync should succeed");

    mount_embedding(&server, "how does move semantics work", &leaning_vector(0, 1, 0.97)).await;

    let results = engine
        .search("how does move semantics work", 5)
        .await
        .expect("search should succeed");

    assert!(!results.is_empty());
    assert_eq!(results[0].slug, "ownership-basics");
    for window in results.windows(2) {
        assert!(window[0].score >= window[1].score, "scores must descend");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_rejects_empty_query() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;

    let err = engine
        .search("   ", 5)
        .await
        .expect_err("blank query must be rejected");
    assert!(matches!(err, RecsyncError::InvalidInput(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stats_report_drift_and_agreement() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;
    seed_corpus(&server, &engine).await;

    let before = engine.stats().await.expect("stats should succeed");
    assert_eq!(before.corpus_documents, 3);
    assert_eq!(before.indexed_vectors, 0);
    assert_eq!(before.missing_keys.len(), 3);

    engine.run_incremental().await.expect("sync should succeed");

    let after = engine.stats().await.expect("stats should succeed");
    assert_eq!(after.corpus_documents, 3);
    assert_eq!(after.indexed_vectors, 3);
    assert_eq!(after.recommendation_rows, 3);
    assert!(after.missing_keys.is_empty());
    assert_eq!(after.index_dimension, DIMENSION);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_corpus_sync_is_clean() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;

    let summary = engine.run_incremental().await.expect("sync should succeed");

    assert!(summary.is_clean());
    assert!(summary.succeeded.is_empty());
    assert_eq!(summary.recommendations_written, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn title_only_document_still_embeds() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;

    engine
        .database()
        .upsert_document(NewDocument {
            slug: "terse-announcement".to_string(),
            title: "A short farewell".to_string(),
            summary: String::new(),
            body: String::new(),
            tags: vec![],
            starred: false,
            published: true,
        })
        .await
        .expect("should store post");
    mount_embedding(&server, "A short farewell", &axis_vector(5)).await;

    let summary = engine.run_incremental().await.expect("sync should succeed");

    assert!(summary.is_clean());
    assert_eq!(summary.succeeded, vec!["terse-announcement"]);
    assert!(
        engine
            .index()
            .fetch("terse-announcement")
            .await
            .expect("fetch should succeed")
            .is_some()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unpublished_documents_stay_out_of_the_index() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = create_engine(&server, &temp_dir).await;

    engine
        .database()
        .upsert_document(published_post(
            "public-post",
            "Public writeup",
            "Visible.",
            &[],
        ))
        .await
        .expect("should store post");
    let mut draft = published_post("secret-draft", "Secret draft", "Hidden.", &[]);
    draft.published = false;
    engine
        .database()
        .upsert_document(draft)
        .await
        .expect("should store draft");
    mount_embedding(&server, "Public writeup", &axis_vector(0)).await;

    let summary = engine.run_incremental().await.expect("sync should succeed");

    assert_eq!(summary.succeeded, vec!["public-post"]);
    assert!(
        engine
            .index()
            .fetch("secret-draft")
            .await
            .expect("fetch should succeed")
            .is_none()
    );
}
