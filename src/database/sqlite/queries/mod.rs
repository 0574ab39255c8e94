
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::recommend::RelatedItem;

pub struct DocumentQueries;

impl DocumentQueries {
    /// Insert a document or replace its mutable fields if the slug already
    /// exists. `created_at` is preserved across replacements.
    #[inline]
    pub async fn upsert(pool: &SqlitePool, document: NewDocument) -> Result<Document> {
        let now = Utc::now().naive_utc();
        let tags_json =
            serde_json::to_string(&document.tags).context("Failed to serialize document tags")?;

        sqlx::query(
            r#"
            INSERT INTO documents (slug, title, summary, body, tags, starred, published, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                title = excluded.title,
                summary = excluded.summary,
                body = excluded.body,
                tags = excluded.tags,
                starred = excluded.starred,
                published = excluded.published,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&document.slug)
        .bind(&document.title)
        .bind(&document.summary)
        .bind(&document.body)
        .bind(&tags_json)
        .bind(document.starred)
        .bind(document.published)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to upsert document")?;

        Self::get_by_slug(pool, &document.slug)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve upserted document"))
    }

    #[inline]
    pub async fn get_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Document>> {
        let result = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, slug, title, summary, body, tags, starred, published, created_at, updated_at
            FROM documents WHERE slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by slug")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, slug, title, summary, body, tags, starred, published, created_at, updated_at
            FROM documents ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list documents")?;

        Ok(documents)
    }

    /// Published documents only. These are the sync pipeline's content keys;
    /// unpublished drafts stay out of the index.
    #[inline]
    pub async fn list_published(pool: &SqlitePool) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, slug, title, summary, body, tags, starred, published, created_at, updated_at
            FROM documents WHERE published = 1 ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list published documents")?;

        Ok(documents)
    }

    #[inline]
    pub async fn list_published_slugs(pool: &SqlitePool) -> Result<Vec<String>> {
        let slugs = sqlx::query_scalar::<_, String>(
            "SELECT slug FROM documents WHERE published = 1 ORDER BY slug ASC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list published slugs")?;

        Ok(slugs)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE slug = ?")
            .bind(slug)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents")
            .fetch_one(pool)
            .await
            .context("Failed to count documents")?;

        Ok(count)
    }

    #[inline]
    pub async fn count_published(pool: &SqlitePool) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE published = 1")
                .fetch_one(pool)
                .await
                .context("Failed to count published documents")?;

        Ok(count)
    }

    #[inline]
    pub async fn count_starred(pool: &SqlitePool) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE starred = 1")
                .fetch_one(pool)
                .await
                .context("Failed to count starred documents")?;

        Ok(count)
    }
}

pub struct RecommendationQueries;

impl RecommendationQueries {
    /// Write the recommendation list for a document, inserting or refreshing
    /// in place. The first computation's `created_at` survives refreshes;
    /// only `updated_at` moves.
    #[inline]
    pub async fn upsert(
        pool: &SqlitePool,
        slug: &str,
        items: &[RelatedItem],
    ) -> Result<RecommendationRecord> {
        let now = Utc::now().naive_utc();
        let items_json =
            serde_json::to_string(items).context("Failed to serialize recommendation items")?;

        sqlx::query(
            r#"
            INSERT INTO recommendations (slug, items, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                items = excluded.items,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(slug)
        .bind(&items_json)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to upsert recommendations")?;

        debug!("Persisted {} recommendations for {}", items.len(), slug);

        Self::get_by_slug(pool, slug)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve upserted recommendations"))
    }

    #[inline]
    pub async fn get_by_slug(
        pool: &SqlitePool,
        slug: &str,
    ) -> Result<Option<RecommendationRecord>> {
        let result = sqlx::query_as::<_, RecommendationRecord>(
            "SELECT id, slug, items, created_at, updated_at FROM recommendations WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get recommendations by slug")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<RecommendationRecord>> {
        let records = sqlx::query_as::<_, RecommendationRecord>(
            "SELECT id, slug, items, created_at, updated_at FROM recommendations ORDER BY slug ASC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list recommendations")?;

        Ok(records)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM recommendations WHERE slug = ?")
            .bind(slug)
            .execute(pool)
            .await
            .context("Failed to delete recommendations")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn delete_all(pool: &SqlitePool) -> Result<usize> {
        let result = sqlx::query("DELETE FROM recommendations")
            .execute(pool)
            .await
            .context("Failed to clear recommendations")?;

        Ok(result.rows_affected() as usize)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recommendations")
            .fetch_one(pool)
            .await
            .context("Failed to count recommendations")?;

        Ok(count)
    }
}
