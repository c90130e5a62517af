//! Category repository
//!
//! Database operations for categories, including the flat reads the
//! category tree is assembled from and the `posts_count` upkeep.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::models::Category;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// Get category by name
    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// List all categories, ordered by position then name
    async fn list(&self, active_only: bool) -> Result<Vec<Category>>;

    /// List root categories (no parent), ordered by position then name
    async fn list_roots(&self, active_only: bool) -> Result<Vec<Category>>;

    /// Get direct children of a category, ordered by position then name
    async fn get_children(&self, parent_id: i64, active_only: bool) -> Result<Vec<Category>>;

    /// Update a category
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category. Children are reparented to the deleted node's
    /// parent so they are not orphaned.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Check if a category name is taken, optionally excluding one row
    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Check if a category slug is taken, optionally excluding one row
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: SqlitePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO categories
               (name, slug, description, parent_id, is_active, show_in_menu, position, posts_count, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)"#,
        )
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(category.parent_id)
        .bind(category.is_active)
        .bind(category.show_in_menu)
        .bind(category.position)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert category")?;

        Ok(Category {
            id: result.last_insert_rowid(),
            posts_count: 0,
            created_at: now,
            updated_at: now,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by id")?;
        Ok(row.map(map_category))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT * FROM categories WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by slug")?;
        Ok(row.map(map_category))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT * FROM categories WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by name")?;
        Ok(row.map(map_category))
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Category>> {
        let sql = if active_only {
            "SELECT * FROM categories WHERE is_active = 1 ORDER BY position, name"
        } else {
            "SELECT * FROM categories ORDER BY position, name"
        };
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list categories")?;
        Ok(rows.into_iter().map(map_category).collect())
    }

    async fn list_roots(&self, active_only: bool) -> Result<Vec<Category>> {
        let sql = if active_only {
            "SELECT * FROM categories WHERE parent_id IS NULL AND is_active = 1 ORDER BY position, name"
        } else {
            "SELECT * FROM categories WHERE parent_id IS NULL ORDER BY position, name"
        };
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list root categories")?;
        Ok(rows.into_iter().map(map_category).collect())
    }

    async fn get_children(&self, parent_id: i64, active_only: bool) -> Result<Vec<Category>> {
        let sql = if active_only {
            "SELECT * FROM categories WHERE parent_id = ? AND is_active = 1 ORDER BY position, name"
        } else {
            "SELECT * FROM categories WHERE parent_id = ? ORDER BY position, name"
        };
        let rows = sqlx::query(sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to get category children")?;
        Ok(rows.into_iter().map(map_category).collect())
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        sqlx::query(
            r#"UPDATE categories
               SET name = ?, slug = ?, description = ?, parent_id = ?,
                   is_active = ?, show_in_menu = ?, position = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(category.parent_id)
        .bind(category.is_active)
        .bind(category.show_in_menu)
        .bind(category.position)
        .bind(now)
        .bind(category.id)
        .execute(&self.pool)
        .await
        .context("Failed to update category")?;

        Ok(Category {
            updated_at: now,
            ..category.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query("SELECT parent_id FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load category for delete")?;

        let Some(row) = row else {
            return Ok(false);
        };
        let parent_id: Option<i64> = row.get("parent_id");

        // Reparent children to the deleted node's parent
        sqlx::query("UPDATE categories SET parent_id = ? WHERE parent_id = ?")
            .bind(parent_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to reparent children")?;

        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete category")?;

        tx.commit().await.context("Failed to commit delete")?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM categories WHERE name = ? AND (? IS NULL OR id != ?)",
        )
        .bind(name)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check category name")?;
        Ok(count > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM categories WHERE slug = ? AND (? IS NULL OR id != ?)",
        )
        .bind(slug)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check category slug")?;
        Ok(count > 0)
    }
}

pub(crate) fn map_category(r: sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: r.get("id"),
        name: r.get("name"),
        slug: r.get("slug"),
        description: r.get("description"),
        parent_id: r.get("parent_id"),
        is_active: r.get("is_active"),
        show_in_menu: r.get("show_in_menu"),
        position: r.get("position"),
        posts_count: r.get("posts_count"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}
