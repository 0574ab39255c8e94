//! MCP Tools Implementation
//!
//! This module provides the tool registration and discovery system,
//! along with concrete tool implementations for sync control, semantic
//! search, and recommendation retrieval.

use crate::mcp::protocol::*;
use crate::mcp::server::ToolHandler;
use crate::sync::SyncEngine;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Wrap a JSON payload as a successful tool result.
fn json_result(value: &serde_json::Value) -> Result<CallToolResult> {
    Ok(CallToolResult {
        content: vec![ToolContent::Text {
            text: serde_json::to_string_pretty(value)?,
        }],
        is_error: Some(false),
    })
}

/// Wrap a failure message as a tool-level error. Engine failures surface
/// this way rather than as protocol errors.
fn error_result(message: String) -> Result<CallToolResult> {
    Ok(CallToolResult {
        content: vec![ToolContent::Text { text: message }],
        is_error: Some(true),
    })
}

/// Single-document sync tool handler
pub struct SyncPostHandler {
    engine: Arc<Mutex<SyncEngine>>,
}

impl SyncPostHandler {
    /// Create a new sync post handler
    #[inline]
    pub fn new(engine: Arc<Mutex<SyncEngine>>) -> Self {
        Self { engine }
    }

    /// Create the sync_post tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "sync_post".to_string(),
            description: Some(
                "Sync one published document into the recommendation index".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "slug": {
                        "type": "string",
                        "description": "Document key to sync"
                    },
                    "whole_corpus": {
                        "type": "boolean",
                        "description": "Optional: Refresh every stored recommendation list, not just this document's (default: false)"
                    }
                },
                "required": ["slug"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SyncPostHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();

        let slug = args
            .get("slug")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing required parameter: slug"))?;
        let whole_corpus = args
            .get("whole_corpus")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        debug!(
            "Tool sync_post: slug='{}', whole_corpus={}",
            slug, whole_corpus
        );

        let engine = self.engine.lock().await;
        match engine.sync_document(slug, whole_corpus).await {
            Ok(summary) => json_result(&serde_json::to_value(&summary)?),
            Err(e) => {
                error!("sync_post failed for {}: {}", slug, e);
                error_result(format!("Sync failed for '{}': {}", slug, e))
            }
        }
    }
}

/// Incremental corpus sync tool handler
pub struct SyncAllHandler {
    engine: Arc<Mutex<SyncEngine>>,
}

impl SyncAllHandler {
    /// Create a new sync all handler
    #[inline]
    pub fn new(engine: Arc<Mutex<SyncEngine>>) -> Self {
        Self { engine }
    }

    /// Create the sync_all tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "sync_all".to_string(),
            description: Some(
                "Embed unindexed published documents and refresh all recommendations".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SyncAllHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Tool sync_all");

        let engine = self.engine.lock().await;
        match engine.run_incremental().await {
            Ok(summary) => json_result(&serde_json::to_value(&summary)?),
            Err(e) => {
                error!("sync_all failed: {}", e);
                error_result(format!("Incremental sync failed: {}", e))
            }
        }
    }
}

/// Full index rebuild tool handler
pub struct RebuildIndexHandler {
    engine: Arc<Mutex<SyncEngine>>,
}

impl RebuildIndexHandler {
    /// Create a new rebuild handler
    #[inline]
    pub fn new(engine: Arc<Mutex<SyncEngine>>) -> Self {
        Self { engine }
    }

    /// Create the rebuild_index tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "rebuild_index".to_string(),
            description: Some(
                "Clear the vector index and re-embed the entire published corpus".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for RebuildIndexHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Tool rebuild_index");

        let engine = self.engine.lock().await;
        match engine.run_full_rebuild().await {
            Ok(summary) => json_result(&serde_json::to_value(&summary)?),
            Err(e) => {
                error!("rebuild_index failed: {}", e);
                error_result(format!("Index rebuild failed: {}", e))
            }
        }
    }
}

/// Index repair tool handler
pub struct RepairIndexHandler {
    engine: Arc<Mutex<SyncEngine>>,
}

impl RepairIndexHandler {
    /// Create a new repair handler
    #[inline]
    pub fn new(engine: Arc<Mutex<SyncEngine>>) -> Self {
        Self { engine }
    }

    /// Create the repair_index tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "repair_index".to_string(),
            description: Some("Re-embed documents with missing or zeroed vectors".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for RepairIndexHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Tool repair_index");

        let engine = self.engine.lock().await;
        match engine.run_repair().await {
            Ok(summary) => json_result(&serde_json::to_value(&summary)?),
            Err(e) => {
                error!("repair_index failed: {}", e);
                error_result(format!("Index repair failed: {}", e))
            }
        }
    }
}

/// Stored recommendation retrieval tool handler
pub struct GetRecommendationsHandler {
    engine: Arc<Mutex<SyncEngine>>,
}

impl GetRecommendationsHandler {
    /// Create a new get recommendations handler
    #[inline]
    pub fn new(engine: Arc<Mutex<SyncEngine>>) -> Self {
        Self { engine }
    }

    /// Create the get_recommendations tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "get_recommendations".to_string(),
            description: Some(
                "Get the stored recommendation list for a document without recomputing".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "slug": {
                        "type": "string",
                        "description": "Document key to look up"
                    }
                },
                "required": ["slug"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for GetRecommendationsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();

        let slug = args
            .get("slug")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing required parameter: slug"))?;

        debug!("Tool get_recommendations: slug='{}'", slug);

        let engine = self.engine.lock().await;
        match engine.database().get_recommendations(slug).await {
            Ok(Some(record)) => {
                let response = json!({
                    "slug": record.slug,
                    "items": record.item_list(),
                    "updated_at": record.updated_at.and_utc().to_rfc3339(),
                });
                json_result(&response)
            }
            Ok(None) => error_result(format!(
                "No recommendations stored for '{}'. Run sync_post or sync_all first.",
                slug
            )),
            Err(e) => {
                error!("get_recommendations failed for {}: {}", slug, e);
                error_result(format!("Failed to read recommendations: {}", e))
            }
        }
    }
}

/// Semantic search tool handler
pub struct SearchPostsHandler {
    engine: Arc<Mutex<SyncEngine>>,
}

impl SearchPostsHandler {
    /// Create a new search posts handler
    #[inline]
    pub fn new(engine: Arc<Mutex<SyncEngine>>) -> Self {
        Self { engine }
    }

    /// Create the search_posts tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "search_posts".to_string(),
            description: Some("Search published documents by meaning".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results (default: 10)"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchPostsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();

        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing required parameter: query"))?;
        let limit = args
            .get("limit")
            .and_then(|v| v.as_i64())
            .unwrap_or(10)
            .max(1) as usize;

        debug!("Tool search_posts: query='{}', limit={}", query, limit);

        let engine = self.engine.lock().await;
        match engine.search(query, limit).await {
            Ok(matches) => {
                let results: Vec<_> = matches
                    .into_iter()
                    .map(|m| {
                        json!({
                            "slug": m.slug,
                            "title": m.metadata.title,
                            "summary": m.metadata.summary,
                            "tags": m.metadata.tags,
                            "starred": m.metadata.starred,
                            "score": m.score,
                        })
                    })
                    .collect();

                json_result(&json!({ "results": results }))
            }
            Err(e) => {
                error!("search_posts failed: {}", e);
                error_result(format!("Search error: {}", e))
            }
        }
    }
}

/// Published document listing tool handler
pub struct ListPostsHandler {
    engine: Arc<Mutex<SyncEngine>>,
}

impl ListPostsHandler {
    /// Create a new list posts handler
    #[inline]
    pub fn new(engine: Arc<Mutex<SyncEngine>>) -> Self {
        Self { engine }
    }

    /// Create the list_posts tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "list_posts".to_string(),
            description: Some("List published documents".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ListPostsHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Tool list_posts");

        let engine = self.engine.lock().await;
        match engine.database().list_published_documents().await {
            Ok(documents) => {
                let posts: Vec<_> = documents
                    .iter()
                    .map(|d| {
                        json!({
                            "slug": d.slug,
                            "title": d.title,
                            "tags": d.tag_list(),
                            "starred": d.starred,
                            "updated_at": d.updated_at.and_utc().to_rfc3339(),
                        })
                    })
                    .collect();

                json_result(&json!({ "posts": posts }))
            }
            Err(e) => {
                error!("list_posts failed: {}", e);
                error_result(format!("Error listing documents: {}", e))
            }
        }
    }
}

/// Sync statistics tool handler
pub struct GetSyncStatsHandler {
    engine: Arc<Mutex<SyncEngine>>,
}

impl GetSyncStatsHandler {
    /// Create a new sync stats handler
    #[inline]
    pub fn new(engine: Arc<Mutex<SyncEngine>>) -> Self {
        Self { engine }
    }

    /// Create the get_sync_stats tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "get_sync_stats".to_string(),
            description: Some(
                "Report corpus, index, and recommendation counters with drift".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for GetSyncStatsHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Tool get_sync_stats");

        let engine = self.engine.lock().await;
        match engine.stats().await {
            Ok(stats) => json_result(&serde_json::to_value(&stats)?),
            Err(e) => {
                error!("get_sync_stats failed: {}", e);
                error_result(format!("Failed to gather sync stats: {}", e))
            }
        }
    }
}

/// Tool registry for managing tool registration
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Create a new tool registry
    #[inline]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    #[inline]
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all registered tools
    #[inline]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.values().cloned().collect()
    }

    /// Get a specific tool by name
    #[inline]
    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Create the default tool registry with sync and retrieval tools
    #[inline]
    pub fn create_default() -> Self {
        let mut registry = Self::new();

        // Register default tools
        registry.register(SyncPostHandler::tool_definition());
        registry.register(SyncAllHandler::tool_definition());
        registry.register(RebuildIndexHandler::tool_definition());
        registry.register(RepairIndexHandler::tool_definition());
        registry.register(GetRecommendationsHandler::tool_definition());
        registry.register(SearchPostsHandler::tool_definition());
        registry.register(ListPostsHandler::tool_definition());
        registry.register(GetSyncStatsHandler::tool_definition());

        registry
    }
}

impl Default for ToolRegistry {
    #[inline]
    fn default() -> Self {
        Self::create_default()
    }
}
