use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    ContentStats, Document, NewDocument, RecommendationRecord,
};
use crate::database::sqlite::queries::{DocumentQueries, RecommendationQueries};
use crate::recommend::RelatedItem;
use crate::{RecsyncError, Result};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(|e| {
                RecsyncError::Database(format!("Failed to open content database: {e}"))
            })?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RecsyncError::Database(format!("Failed to run schema migration: {e}")))?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("corpus.db");
        let db_url = db_path.to_string_lossy();

        std::fs::create_dir_all(config_dir).map_err(|e| {
            RecsyncError::Database(format!(
                "Failed to create config directory {}: {e}",
                config_dir.display()
            ))
        })?;

        Self::new(db_url.as_ref()).await
    }

    // Document operations
    pub async fn upsert_document(&self, document: NewDocument) -> Result<Document> {
        Ok(DocumentQueries::upsert(&self.pool, document).await?)
    }

    pub async fn get_document(&self, slug: &str) -> Result<Option<Document>> {
        Ok(DocumentQueries::get_by_slug(&self.pool, slug).await?)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(DocumentQueries::list_all(&self.pool).await?)
    }

    pub async fn list_published_documents(&self) -> Result<Vec<Document>> {
        Ok(DocumentQueries::list_published(&self.pool).await?)
    }

    pub async fn list_published_slugs(&self) -> Result<Vec<String>> {
        Ok(DocumentQueries::list_published_slugs(&self.pool).await?)
    }

    pub async fn delete_document(&self, slug: &str) -> Result<bool> {
        Ok(DocumentQueries::delete(&self.pool, slug).await?)
    }

    // Recommendation operations
    pub async fn upsert_recommendations(
        &self,
        slug: &str,
        items: &[RelatedItem],
    ) -> Result<RecommendationRecord> {
        Ok(RecommendationQueries::upsert(&self.pool, slug, items).await?)
    }

    pub async fn get_recommendations(&self, slug: &str) -> Result<Option<RecommendationRecord>> {
        Ok(RecommendationQueries::get_by_slug(&self.pool, slug).await?)
    }

    pub async fn list_recommendations(&self) -> Result<Vec<RecommendationRecord>> {
        Ok(RecommendationQueries::list_all(&self.pool).await?)
    }

    pub async fn clear_recommendations(&self) -> Result<usize> {
        Ok(RecommendationQueries::delete_all(&self.pool).await?)
    }

    pub async fn content_stats(&self) -> Result<ContentStats> {
        let total_documents = DocumentQueries::count(&self.pool).await?;
        let published_documents = DocumentQueries::count_published(&self.pool).await?;
        let starred_documents = DocumentQueries::count_starred(&self.pool).await?;
        let recommendation_rows = RecommendationQueries::count(&self.pool).await?;

        Ok(ContentStats {
            total_documents,
            published_documents,
            starred_documents,
            recommendation_rows,
        })
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        // Run VACUUM to reclaim space and defragment
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| RecsyncError::Database(format!("Failed to vacuum database: {e}")))?;

        // Run ANALYZE to update table statistics for better query planning
        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .map_err(|e| RecsyncError::Database(format!("Failed to analyze database: {e}")))?;

        debug!("Database optimization completed");
        Ok(())
    }
}
