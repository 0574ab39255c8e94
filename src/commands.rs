use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{Config, get_config_dir, run_interactive_config, show_config};
use crate::database::lancedb::vector_store::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::GeminiClient;
use crate::mcp::McpServer;
use crate::mcp::tools::{
    GetRecommendationsHandler, GetSyncStatsHandler, ListPostsHandler, RebuildIndexHandler,
    RepairIndexHandler, SearchPostsHandler, SyncAllHandler, SyncPostHandler,
};
use crate::sync::{PassSummary, SyncEngine};

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(&config_dir).context("Failed to load configuration")
}

fn print_pass_summary(summary: &PassSummary) {
    println!("  Documents embedded: {}", summary.succeeded.len());
    println!(
        "  Recommendation lists written: {}",
        summary.recommendations_written
    );

    if !summary.failed.is_empty() {
        println!("  Failed keys: {}", summary.failed.len());
        for failure in &summary.failed {
            println!("    ❌ {}: {}", failure.key, failure.reason);
        }
    }

    if !summary.orphaned.is_empty() {
        println!(
            "  ⚠️  Orphaned vectors (no published post behind them): {}",
            summary.orphaned.len()
        );
        for slug in &summary.orphaned {
            println!("    👻 {}", slug);
        }
        println!("  Orphans are reported only; use 'recsync rebuild' to drop them.");
    }
}

/// Run the interactive configuration wizard, or print the current settings
#[inline]
pub fn configure(show: bool) -> Result<()> {
    let config_dir = get_config_dir()?;

    if show {
        show_config(&config_dir)
    } else {
        run_interactive_config(&config_dir)
    }
}

/// Embed whatever is published but not yet indexed, then refresh every
/// stored recommendation list
#[inline]
pub async fn run_sync() -> Result<()> {
    info!("Starting incremental sync");
    let config = load_config()?;

    println!("🔄 Running incremental sync...");
    let engine = SyncEngine::initialize(config)
        .await
        .context("Failed to initialize sync engine")?;

    match engine.run_incremental().await {
        Ok(summary) => {
            println!("Sync completed successfully!");
            print_pass_summary(&summary);
        }
        Err(e) => {
            error!("Sync failed: {}", e);
            println!("Sync failed: {}", e);
        }
    }

    Ok(())
}

/// Sync a single post end to end
#[inline]
pub async fn run_sync_post(slug: String, whole_corpus: bool) -> Result<()> {
    info!("Syncing post: {}", slug);
    let config = load_config()?;

    println!("🔄 Syncing post '{}'...", slug);
    let engine = SyncEngine::initialize(config)
        .await
        .context("Failed to initialize sync engine")?;

    match engine.sync_document(&slug, whole_corpus).await {
        Ok(summary) => {
            println!("Post synced successfully!");
            print_pass_summary(&summary);
        }
        Err(e) => {
            error!("Sync failed for {}: {}", slug, e);
            println!("Sync failed for '{}': {}", slug, e);
        }
    }

    Ok(())
}

/// Clear the vector index and re-embed the entire published corpus
#[inline]
pub async fn run_rebuild() -> Result<()> {
    info!("Starting full index rebuild");
    let config = load_config()?;

    println!("🔨 Rebuilding the vector index from scratch...");
    let engine = SyncEngine::initialize(config)
        .await
        .context("Failed to initialize sync engine")?;

    match engine.run_full_rebuild().await {
        Ok(summary) => {
            println!("Rebuild completed successfully!");
            print_pass_summary(&summary);
        }
        Err(e) => {
            error!("Rebuild failed: {}", e);
            println!("Rebuild failed: {}", e);
        }
    }

    Ok(())
}

/// Re-embed posts whose vectors are missing or zeroed out
#[inline]
pub async fn run_repair() -> Result<()> {
    info!("Starting repair pass");
    let config = load_config()?;

    println!("🔧 Repairing the vector index...");
    let engine = SyncEngine::initialize(config)
        .await
        .context("Failed to initialize sync engine")?;

    match engine.run_repair().await {
        Ok(summary) => {
            println!("Repair completed successfully!");
            print_pass_summary(&summary);
        }
        Err(e) => {
            error!("Repair failed: {}", e);
            println!("Repair failed: {}", e);
        }
    }

    Ok(())
}

/// Show detailed status of the sync pipeline
#[inline]
pub async fn show_status() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).unwrap_or_else(|_| Config {
        base_dir: config_dir.clone(),
        ..Config::default()
    });

    println!("📊 Recsync Status Report");
    println!("{}", "=".repeat(50));
    println!();

    // Content database connectivity
    println!("🗄️  Content Database:");
    match Database::initialize_from_config_dir(config.get_base_dir()).await {
        Ok(database) => {
            println!("   ✅ SQLite: Connected");
            match database.content_stats().await {
                Ok(stats) => {
                    println!(
                        "   📄 Documents: {} total, {} published, {} starred",
                        stats.total_documents, stats.published_documents, stats.starred_documents
                    );
                    println!("   📑 Recommendation rows: {}", stats.recommendation_rows);
                }
                Err(e) => {
                    println!("   ⚠️  Statistics unavailable: {}", e);
                }
            }
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
        }
    }

    // Embedding provider connectivity
    println!("🤖 Embedding Provider:");
    match GeminiClient::new(&config.embedding) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Provider: Connected ({}:{})",
                    config.embedding.host, config.embedding.port
                );
                println!("   📋 Model: {}", config.embedding.model);
                println!("   🔢 Dimension: {}", config.embedding.dimension);
            }
            Err(e) => {
                println!("   ⚠️  Provider: Reachable but unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Provider: Failed to configure - {}", e);
        }
    }

    // Vector index status
    println!("🔍 Vector Index:");
    match VectorStore::new(&config).await {
        Ok(store) => {
            match store.stats().await {
                Ok(stats) => {
                    println!("   ✅ LanceDB: Connected");
                    println!(
                        "   📊 Vectors: {} at dimension {}",
                        stats.total_vectors, stats.dimension
                    );
                }
                Err(e) => {
                    println!("   ⚠️  LanceDB: Connected but stats failed - {}", e);
                }
            }
            match store.validate_integrity().await {
                Ok(true) => println!("   ✅ Integrity: OK"),
                Ok(false) => println!("   ⚠️  Integrity: Failed - run 'recsync rebuild'"),
                Err(e) => println!("   ⚠️  Integrity check error: {}", e),
            }
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {}", e);
        }
    }

    // Corpus vs index drift
    println!();
    println!("🔄 Sync Drift:");
    match SyncEngine::initialize(config).await {
        Ok(engine) => match engine.stats().await {
            Ok(stats) => {
                if stats.missing_keys.is_empty() {
                    println!(
                        "   ✅ Corpus and index agree ({} published posts, {} vectors)",
                        stats.corpus_documents, stats.indexed_vectors
                    );
                } else {
                    println!(
                        "   ⚠️  {} posts missing from the index:",
                        stats.missing_keys.len()
                    );
                    for slug in &stats.missing_keys {
                        println!("      🚫 {}", slug);
                    }
                    println!("   💡 Run 'recsync sync' to index them");
                }
            }
            Err(e) => {
                println!("   ❌ Failed to compute drift: {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Failed to initialize sync engine: {}", e);
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'recsync sync' to index new posts and refresh recommendations");
    println!("   • Use 'recsync search <query>' to try semantic search");
    println!("   • Use 'recsync serve' to start the MCP server for AI assistants");

    Ok(())
}

/// Search published posts by meaning
#[inline]
pub async fn run_search(query: String, limit: usize) -> Result<()> {
    info!("Searching posts: {}", query);
    let config = load_config()?;

    let engine = SyncEngine::initialize(config)
        .await
        .context("Failed to initialize sync engine")?;

    match engine.search(&query, limit).await {
        Ok(matches) => {
            if matches.is_empty() {
                println!("No matching posts found.");
                return Ok(());
            }

            println!("Search results ({} total):", matches.len());
            println!();

            for result in &matches {
                println!("📄 {} (score: {:.4})", result.metadata.title, result.score);
                println!("   Slug: {}", result.slug);
                if !result.metadata.summary.is_empty() {
                    println!("   {}", result.metadata.summary);
                }
                if !result.metadata.tags.is_empty() {
                    println!("   Tags: {}", result.metadata.tags.join(", "));
                }
                println!();
            }
        }
        Err(e) => {
            error!("Search failed: {}", e);
            println!("Search failed: {}", e);
        }
    }

    Ok(())
}

/// Print the stored recommendation list for a post without recomputing
#[inline]
pub async fn show_recommendations(slug: String) -> Result<()> {
    let config = load_config()?;
    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize database")?;

    match database.get_recommendations(&slug).await? {
        Some(record) => {
            let items = record.item_list();
            println!("Recommendations for '{}' ({} total):", slug, items.len());
            println!(
                "Last computed: {}",
                record.updated_at.and_utc().to_rfc3339()
            );
            println!();

            for item in &items {
                let star = if item.starred { "⭐ " } else { "" };
                println!("📄 {}{} (score: {:.4})", star, item.title, item.score);
                println!("   Slug: {}", item.slug);
                if !item.tags.is_empty() {
                    println!("   Tags: {}", item.tags.join(", "));
                }
                println!();
            }
        }
        None => {
            println!("No recommendations stored for '{}'.", slug);
            println!(
                "Use 'recsync sync-post {}' or 'recsync sync' to compute them.",
                slug
            );
        }
    }

    Ok(())
}

async fn register_tools(server: &McpServer, engine: &Arc<Mutex<SyncEngine>>) -> Result<()> {
    server
        .register_tool(
            SyncPostHandler::tool_definition(),
            SyncPostHandler::new(Arc::clone(engine)),
        )
        .await
        .context("Failed to register sync_post tool")?;

    server
        .register_tool(
            SyncAllHandler::tool_definition(),
            SyncAllHandler::new(Arc::clone(engine)),
        )
        .await
        .context("Failed to register sync_all tool")?;

    server
        .register_tool(
            RebuildIndexHandler::tool_definition(),
            RebuildIndexHandler::new(Arc::clone(engine)),
        )
        .await
        .context("Failed to register rebuild_index tool")?;

    server
        .register_tool(
            RepairIndexHandler::tool_definition(),
            RepairIndexHandler::new(Arc::clone(engine)),
        )
        .await
        .context("Failed to register repair_index tool")?;

    server
        .register_tool(
            GetRecommendationsHandler::tool_definition(),
            GetRecommendationsHandler::new(Arc::clone(engine)),
        )
        .await
        .context("Failed to register get_recommendations tool")?;

    server
        .register_tool(
            SearchPostsHandler::tool_definition(),
            SearchPostsHandler::new(Arc::clone(engine)),
        )
        .await
        .context("Failed to register search_posts tool")?;

    server
        .register_tool(
            ListPostsHandler::tool_definition(),
            ListPostsHandler::new(Arc::clone(engine)),
        )
        .await
        .context("Failed to register list_posts tool")?;

    server
        .register_tool(
            GetSyncStatsHandler::tool_definition(),
            GetSyncStatsHandler::new(Arc::clone(engine)),
        )
        .await
        .context("Failed to register get_sync_stats tool")?;

    Ok(())
}

/// Start the MCP server on stdio with a shared sync engine
#[inline]
pub async fn serve_mcp() -> Result<()> {
    info!("Starting MCP server");

    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    // Verify provider connectivity before starting
    match GeminiClient::new(&config.embedding) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                info!(
                    "✅ Provider connected at {}:{} with model {}",
                    config.embedding.host, config.embedding.port, config.embedding.model
                );
            }
            Err(e) => {
                warn!("⚠️  Provider is reachable but unhealthy: {}", e);
                println!("Warning: The embedding provider may not be ready. Sync passes may fail.");
            }
        },
        Err(e) => {
            error!("❌ Failed to configure the embedding provider: {}", e);
            println!(
                "Error: Cannot configure the provider at {}:{}",
                config.embedding.host, config.embedding.port
            );
            println!("Use 'recsync config' to update connection settings.");
            return Err(e.into());
        }
    }

    // Initialize MCP server components
    println!("🌐 Initializing MCP server...");

    let engine = SyncEngine::initialize(config)
        .await
        .context("Failed to initialize sync engine")?;
    let engine = Arc::new(Mutex::new(engine));

    let server = Arc::new(McpServer::new(
        "recsync".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));

    register_tools(&server, &engine).await?;

    println!("✅ MCP server initialized with tools:");
    println!("   sync_post, sync_all, rebuild_index, repair_index,");
    println!("   get_recommendations, search_posts, list_posts, get_sync_stats");
    println!("🌐 Starting MCP server on stdio transport...");
    println!("📊 Use 'recsync status' to check corpus and index health");
    println!();
    println!("Note: This server uses stdio transport. Connect via MCP client.");
    println!("Press Ctrl+C to stop the server");

    // Run the server with retry logic
    let mut restart_count = 0;
    const MAX_RESTARTS: u32 = 3;

    loop {
        tokio::select! {
            result = Arc::clone(&server).serve_stdio() => {
                match result {
                    Ok(()) => {
                        info!("MCP server stopped normally");
                        break;
                    }
                    Err(e) => {
                        error!("MCP server error (attempt {}/{}): {}", restart_count + 1, MAX_RESTARTS + 1, e);
                        restart_count += 1;

                        if restart_count > MAX_RESTARTS {
                            error!("Maximum restart attempts reached, shutting down");
                            break;
                        }

                        println!("⚠️  MCP server encountered an error, restarting in 5 seconds...");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                        println!("🔄 Restarting MCP server (attempt {}/{})...", restart_count + 1, MAX_RESTARTS + 1);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n📴 Received interrupt signal, shutting down...");
                break;
            }
        }
    }

    println!("✅ Shutdown complete");

    Ok(())
}
