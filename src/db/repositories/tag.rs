//! Tag repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::models::Tag;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag
    async fn create(&self, name: &str, slug: &str) -> Result<Tag>;

    /// Get tag by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Get tag by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// Get tag by name
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// List tags ordered by usage, most used first
    async fn list(&self, limit: i64) -> Result<Vec<Tag>>;

    /// List tags in use (posts_count > 0), most used first
    async fn popular(&self, limit: i64) -> Result<Vec<Tag>>;

    /// Delete a tag
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Check if a tag slug is taken, optionally excluding one row
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: SqlitePool,
}

impl SqlxTagRepository {
    /// Create a new SQLx tag repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, name: &str, slug: &str) -> Result<Tag> {
        let result = sqlx::query("INSERT INTO tags (name, slug, posts_count) VALUES (?, ?, 0)")
            .bind(name)
            .bind(slug)
            .execute(&self.pool)
            .await
            .context("Failed to insert tag")?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            slug: slug.to_string(),
            posts_count: 0,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT * FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tag by id")?;
        Ok(row.map(map_tag))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT * FROM tags WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tag by slug")?;
        Ok(row.map(map_tag))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT * FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tag by name")?;
        Ok(row.map(map_tag))
    }

    async fn list(&self, limit: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT * FROM tags ORDER BY posts_count DESC, name LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tags")?;
        Ok(rows.into_iter().map(map_tag).collect())
    }

    async fn popular(&self, limit: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT * FROM tags WHERE posts_count > 0 ORDER BY posts_count DESC, name LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list popular tags")?;
        Ok(rows.into_iter().map(map_tag).collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete tag")?;
        Ok(result.rows_affected() > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tags WHERE slug = ? AND (? IS NULL OR id != ?)",
        )
        .bind(slug)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check tag slug")?;
        Ok(count > 0)
    }
}

pub(crate) fn map_tag(r: sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: r.get("id"),
        name: r.get("name"),
        slug: r.get("slug"),
        posts_count: r.get("posts_count"),
    }
}
