
use super::{EntryMetadata, IndexEntry, IndexStats, SearchMatch};
use crate::config::Config;
use crate::{RecsyncError, Result};
use arrow::array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
    table::Table,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Vector index over document embeddings, backed by LanceDB.
///
/// The vector dimension is fixed by configuration at construction. Opening a
/// store over a table built with a different dimension fails instead of
/// silently recreating the table; a rebuild is an explicit operation.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
    batch_size: usize,
}

impl VectorStore {
    /// Open (or create) the index table under the configured base directory.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = config
            .vector_database_path()
            .map_err(|e| RecsyncError::Config(format!("Failed to resolve index path: {}", e)))?;
        debug!("Initializing LanceDB at path: {:?}", db_path);

        // Ensure the directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecsyncError::IndexUnavailable(format!(
                    "Failed to create vector index directory: {}",
                    e
                ))
            })?;
        }

        let uri = format!("file://{}", db_path.display());

        // Attempt to connect with corruption recovery
        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                // Check if this looks like a corruption error
                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Index corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(&db_path)?;

                    // Retry connection after recovery
                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        RecsyncError::IndexUnavailable(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(RecsyncError::IndexUnavailable(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        let store = Self {
            connection,
            table_name: config.index.table_name.clone(),
            dimension: config.embedding.dimension as usize,
            batch_size: config.index.batch_size,
        };

        store.initialize_table_with_recovery().await?;

        info!(
            "Vector index ready: table '{}', {} dimensions",
            store.table_name, store.dimension
        );
        Ok(store)
    }

    /// The configured vector dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Create the table if missing, or verify the stored dimension when it
    /// already exists.
    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RecsyncError::IndexUnavailable(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            let stored = self.stored_dimension().await?;
            if stored != self.dimension {
                return Err(RecsyncError::DimensionMismatch {
                    expected: self.dimension,
                    actual: stored,
                });
            }
            debug!(
                "Index table '{}' already exists with matching dimension",
                self.table_name
            );
            return Ok(());
        }

        info!(
            "Creating index table '{}' with {} dimensions",
            self.table_name, self.dimension
        );

        self.connection
            .create_empty_table(&self.table_name, self.schema())
            .execute()
            .await
            .map_err(|e| {
                RecsyncError::IndexUnavailable(format!("Failed to create table: {}", e))
            })?;

        Ok(())
    }

    /// Read the vector dimension out of the existing table schema.
    async fn stored_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;

        let schema = table.schema().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to get table schema: {}", e))
        })?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RecsyncError::IndexUnavailable(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("slug", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("title", DataType::Utf8, false),
            Field::new("summary", DataType::Utf8, false),
            Field::new("tags", DataType::Utf8, false),
            Field::new("starred", DataType::Boolean, false),
            Field::new("updated_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RecsyncError::IndexUnavailable(format!("Failed to open table: {}", e)))
    }

    /// Write or replace a single entry. The previous row for the slug, if
    /// any, is removed first so each document holds exactly one vector.
    #[inline]
    pub async fn upsert(&self, entry: IndexEntry) -> Result<()> {
        self.upsert_batch(vec![entry]).await?;
        Ok(())
    }

    /// Write or replace a batch of entries, chunked by the configured batch
    /// size. Returns the number of entries written.
    ///
    /// Every vector is dimension-checked before anything touches the table.
    /// If a chunk fails after earlier chunks landed, the error reports how
    /// many entries were written so the caller knows the index moved.
    #[inline]
    pub async fn upsert_batch(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        if entries.is_empty() {
            debug!("No index entries to upsert");
            return Ok(0);
        }

        for entry in &entries {
            if entry.vector.len() != self.dimension {
                return Err(RecsyncError::DimensionMismatch {
                    expected: self.dimension,
                    actual: entry.vector.len(),
                });
            }
        }

        let table = self.open_table().await?;
        let mut written = 0usize;

        for chunk in entries.chunks(self.batch_size) {
            if let Err(e) = self.write_chunk(&table, chunk).await {
                if written == 0 {
                    return Err(e);
                }
                return Err(RecsyncError::PartialBatchFailure {
                    written,
                    message: e.to_string(),
                });
            }
            written += chunk.len();
        }

        debug!("Upserted {} index entries", written);
        Ok(written)
    }

    /// Replace one chunk of rows: delete any existing rows for these slugs,
    /// then append the new ones.
    async fn write_chunk(&self, table: &Table, chunk: &[IndexEntry]) -> Result<()> {
        let predicate = slugs_predicate(chunk.iter().map(|e| e.slug.as_str()));
        table.delete(&predicate).await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to clear existing rows: {}", e))
        })?;

        let record_batch = self.create_record_batch(chunk)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table.add(reader).execute().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to insert entries: {}", e))
        })?;

        Ok(())
    }

    /// Build an Arrow batch from index entries.
    fn create_record_batch(&self, entries: &[IndexEntry]) -> Result<RecordBatch> {
        let len = entries.len();

        let mut slugs = Vec::with_capacity(len);
        let mut vectors = Vec::with_capacity(len);
        let mut titles = Vec::with_capacity(len);
        let mut summaries = Vec::with_capacity(len);
        let mut tags = Vec::with_capacity(len);
        let mut starred = Vec::with_capacity(len);
        let mut updated_ats = Vec::with_capacity(len);

        for entry in entries {
            slugs.push(entry.slug.as_str());
            vectors.push(&entry.vector);
            titles.push(entry.metadata.title.as_str());
            summaries.push(entry.metadata.summary.as_str());
            tags.push(
                serde_json::to_string(&entry.metadata.tags).unwrap_or_else(|_| "[]".to_string()),
            );
            starred.push(entry.metadata.starred);
            updated_ats.push(entry.metadata.updated_at.as_str());
        }

        let mut flat_values = Vec::with_capacity(len * self.dimension);
        for vector in &vectors {
            flat_values.extend_from_slice(vector);
        }
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, self.dimension as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    RecsyncError::IndexUnavailable(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(slugs)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(summaries)),
            Arc::new(StringArray::from(tags)),
            Arc::new(BooleanArray::from(starred)),
            Arc::new(StringArray::from(updated_ats)),
        ];

        RecordBatch::try_new(self.schema(), arrays).map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to create record batch: {}", e))
        })
    }

    /// Fetch one entry by slug, vector included.
    #[inline]
    pub async fn fetch(&self, slug: &str) -> Result<Option<IndexEntry>> {
        let table = self.open_table().await?;

        let mut results = table
            .query()
            .only_if(format!("slug = '{}'", escape_literal(slug)))
            .limit(1)
            .execute()
            .await
            .map_err(|e| {
                RecsyncError::IndexUnavailable(format!("Failed to query entry: {}", e))
            })?;

        while let Some(batch) = results.try_next().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to read result stream: {}", e))
        })? {
            let mut entries = parse_entry_batch(&batch)?;
            if !entries.is_empty() {
                return Ok(Some(entries.swap_remove(0)));
            }
        }

        Ok(None)
    }

    /// Nearest neighbors of a query vector by cosine distance, closest first.
    ///
    /// A query against a document that is itself indexed returns that
    /// document as its own best match; callers filter it out.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchMatch>> {
        if query_vector.len() != self.dimension {
            return Err(RecsyncError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        debug!("Searching for similar vectors with limit: {}", limit);
        let table = self.open_table().await?;

        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| {
                RecsyncError::IndexUnavailable(format!("Failed to create vector search: {}", e))
            })?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| {
                RecsyncError::IndexUnavailable(format!("Failed to execute search: {}", e))
            })?;

        let mut matches = Vec::new();
        while let Some(batch) = results.try_next().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to read result stream: {}", e))
        })? {
            matches.extend(parse_match_batch(&batch)?);
        }

        debug!("Parsed {} search results", matches.len());
        Ok(matches)
    }

    /// All slugs currently indexed, sorted. These are the reconciler's index
    /// keys.
    #[inline]
    pub async fn list_slugs(&self) -> Result<Vec<String>> {
        let table = self.open_table().await?;

        let mut results = table.query().execute().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to scan index: {}", e))
        })?;

        let mut slugs = Vec::new();
        while let Some(batch) = results.try_next().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to read result stream: {}", e))
        })? {
            let column = string_column(&batch, "slug")?;
            for row in 0..batch.num_rows() {
                slugs.push(column.value(row).to_string());
            }
        }

        slugs.sort();
        Ok(slugs)
    }

    /// Full scan of every entry, vectors included, sorted by slug. Repair
    /// passes use this to find rows holding the zero sentinel.
    #[inline]
    pub async fn list_entries(&self) -> Result<Vec<IndexEntry>> {
        let table = self.open_table().await?;

        let mut results = table.query().execute().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to scan index: {}", e))
        })?;

        let mut entries = Vec::new();
        while let Some(batch) = results.try_next().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to read result stream: {}", e))
        })? {
            entries.extend(parse_entry_batch(&batch)?);
        }

        entries.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(entries)
    }

    /// Remove one entry. Returns whether a row existed for the slug.
    #[inline]
    pub async fn delete(&self, slug: &str) -> Result<bool> {
        debug!("Deleting index entry for slug: {}", slug);

        if self.fetch(slug).await?.is_none() {
            return Ok(false);
        }

        let table = self.open_table().await?;
        let predicate = format!("slug = '{}'", escape_literal(slug));
        table.delete(&predicate).await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to delete entry: {}", e))
        })?;

        Ok(true)
    }

    /// Drop every entry and recreate the empty table. Used by full rebuilds.
    #[inline]
    pub async fn delete_all(&self) -> Result<()> {
        self.drop_table_if_exists().await?;

        self.connection
            .create_empty_table(&self.table_name, self.schema())
            .execute()
            .await
            .map_err(|e| {
                RecsyncError::IndexUnavailable(format!("Failed to recreate table: {}", e))
            })?;

        info!("Vector index cleared");
        Ok(())
    }

    /// Number of entries currently indexed.
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;

        table
            .count_rows(None)
            .await
            .map_err(|e| RecsyncError::IndexUnavailable(format!("Failed to count rows: {}", e)))
    }

    /// Summary counters for status displays.
    #[inline]
    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            total_vectors: self.count().await?,
            dimension: self.dimension,
            table_name: self.table_name.clone(),
        })
    }

    /// Compact and reorganize the index files.
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        debug!("Optimizing vector index");
        let table = self.open_table().await?;

        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| {
                RecsyncError::IndexUnavailable(format!("Failed to optimize table: {}", e))
            })?;

        info!("Vector index optimization completed");
        Ok(())
    }

    /// Whether the index can be listed, opened, and counted. `false` means
    /// the store needs a repair pass, not that an operation failed.
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool> {
        debug!("Validating index integrity");

        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.contains(&self.table_name) {
            warn!("Index table missing during integrity check");
            return Ok(false);
        }

        match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => match table.count_rows(None).await {
                Ok(count) => {
                    debug!("Index integrity check passed, {} rows found", count);
                    Ok(true)
                }
                Err(e) => {
                    error!("Failed to count rows during integrity check: {}", e);
                    Ok(false)
                }
            },
            Err(e) => {
                error!("Failed to open table during integrity check: {}", e);
                Ok(false)
            }
        }
    }

    /// Back up and clear a database directory that no longer connects.
    fn attempt_corruption_recovery(db_path: &PathBuf) -> Result<()> {
        warn!("Attempting index corruption recovery at {:?}", db_path);

        // Keep the broken files around for inspection
        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to back up corrupted index: {}", e);
            } else {
                info!("Corrupted index backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                RecsyncError::IndexUnavailable(format!("Failed to remove corrupted index: {}", e))
            })?;
        }

        info!("Index corruption recovery completed");
        Ok(())
    }

    async fn initialize_table_with_recovery(&self) -> Result<()> {
        match self.initialize_table().await {
            Ok(()) => Ok(()),
            // A dimension conflict is a configuration problem, not corruption
            Err(e @ RecsyncError::DimensionMismatch { .. }) => Err(e),
            Err(e) => {
                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("schema")
                {
                    warn!("Table corruption detected during initialization: {}", e);

                    if let Err(drop_err) = self.drop_table_if_exists().await {
                        warn!("Failed to drop corrupted table: {}", drop_err);
                    }

                    self.initialize_table().await.map_err(|e| {
                        RecsyncError::IndexUnavailable(format!(
                            "Failed to recreate table after corruption: {}",
                            e
                        ))
                    })
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        let table_names = self.connection.table_names().execute().await.map_err(|e| {
            RecsyncError::IndexUnavailable(format!("Failed to list tables for drop: {}", e))
        })?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing index table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| {
                    RecsyncError::IndexUnavailable(format!("Failed to drop table: {}", e))
                })?;
        }

        Ok(())
    }
}

/// Escape a string for use inside a single-quoted SQL literal.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Build a `slug IN (...)` predicate for a set of slugs.
fn slugs_predicate<'a>(slugs: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = slugs
        .map(|s| format!("'{}'", escape_literal(s)))
        .collect();
    format!("slug IN ({})", quoted.join(", "))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RecsyncError::IndexUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RecsyncError::IndexUnavailable(format!("Invalid {} column type", name)))
}

fn bool_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a BooleanArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RecsyncError::IndexUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| RecsyncError::IndexUnavailable(format!("Invalid {} column type", name)))
}

fn metadata_from_row(batch: &RecordBatch, row: usize) -> Result<EntryMetadata> {
    let titles = string_column(batch, "title")?;
    let summaries = string_column(batch, "summary")?;
    let tags = string_column(batch, "tags")?;
    let starred = bool_column(batch, "starred")?;
    let updated_ats = string_column(batch, "updated_at")?;

    Ok(EntryMetadata {
        title: titles.value(row).to_string(),
        summary: summaries.value(row).to_string(),
        tags: serde_json::from_str(tags.value(row)).unwrap_or_default(),
        starred: starred.value(row),
        updated_at: updated_ats.value(row).to_string(),
    })
}

/// Parse full rows, vectors included, from a scan or fetch.
fn parse_entry_batch(batch: &RecordBatch) -> Result<Vec<IndexEntry>> {
    let slugs = string_column(batch, "slug")?;
    let vectors = batch
        .column_by_name("vector")
        .ok_or_else(|| RecsyncError::IndexUnavailable("Missing vector column".to_string()))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| RecsyncError::IndexUnavailable("Invalid vector column type".to_string()))?;

    let mut entries = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values = vectors.value(row);
        let floats = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| {
                RecsyncError::IndexUnavailable("Invalid vector payload type".to_string())
            })?;

        entries.push(IndexEntry {
            slug: slugs.value(row).to_string(),
            vector: floats.values().to_vec(),
            metadata: metadata_from_row(batch, row)?,
        });
    }

    Ok(entries)
}

/// Parse search hits, converting the reported cosine distance into a
/// similarity score where higher is closer.
fn parse_match_batch(batch: &RecordBatch) -> Result<Vec<SearchMatch>> {
    let slugs = string_column(batch, "slug")?;
    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut matches = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        matches.push(SearchMatch {
            slug: slugs.value(row).to_string(),
            score: 1.0 - distance,
            metadata: metadata_from_row(batch, row)?,
        });
    }

    Ok(matches)
}
