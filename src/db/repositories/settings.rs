//! Settings repository
//!
//! Key-value store for site-wide settings.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// A setting key-value pair
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Repository trait for settings operations
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Get a single setting by key
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    /// Get all settings
    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// Set a single setting (insert or overwrite)
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Insert a setting only if the key is not already present.
    /// Returns true if the row was inserted.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;
}

/// SQLx-based settings repository
pub struct SqlxSettingsRepository {
    pool: SqlitePool,
}

impl SqlxSettingsRepository {
    /// Create a new SQLx settings repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        let row = sqlx::query("SELECT key, value, updated_at FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get setting")?;
        Ok(row.map(map_setting))
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list settings")?;
        Ok(rows.into_iter().map(map_setting).collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to set setting")?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES (?, ?, ?)")
                .bind(key)
                .bind(value)
                .bind(Utc::now())
                .execute(&self.pool)
                .await
                .context("Failed to seed setting")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("Failed to delete setting")?;
        Ok(())
    }
}

fn map_setting(r: sqlx::sqlite::SqliteRow) -> Setting {
    Setting {
        key: r.get("key"),
        value: r.get::<Option<String>, _>("value").unwrap_or_default(),
        updated_at: r.get("updated_at"),
    }
}
