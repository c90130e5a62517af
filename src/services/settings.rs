//! Settings service
//!
//! Business logic for site settings management. Settings are stored as
//! string key-value pairs; typed accessors parse on read and fall back to
//! the default when a key is missing or malformed.

use crate::db::repositories::{CategoryRepository, Setting, SettingsRepository};
use crate::models::Category;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Setting keys seeded on first start
pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const SITE_DESCRIPTION: &str = "site_description";
    pub const POSTS_PER_PAGE: &str = "posts_per_page";
    pub const COMMENTS_PER_PAGE: &str = "comments_per_page";
    pub const COMMENTS_REQUIRE_APPROVAL: &str = "comments_require_approval";
}

/// Name of the category every install starts with
const DEFAULT_CATEGORY_NAME: &str = "General";

/// Error types for settings service operations
#[derive(Debug, thiserror::Error)]
pub enum SettingsServiceError {
    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Settings service for site-wide configuration values
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    category_repo: Arc<dyn CategoryRepository>,
}

impl SettingsService {
    /// Create a new settings service
    pub fn new(
        repo: Arc<dyn SettingsRepository>,
        category_repo: Arc<dyn CategoryRepository>,
    ) -> Self {
        Self {
            repo,
            category_repo,
        }
    }

    /// Get a setting value as a string
    pub async fn get(&self, key: &str) -> Result<Option<String>, SettingsServiceError> {
        let setting = self
            .repo
            .get(key)
            .await
            .context("Failed to get setting")?;
        Ok(setting.map(|s| s.value))
    }

    /// Get a setting value, falling back to a default when absent
    pub async fn get_or(&self, key: &str, default: &str) -> Result<String, SettingsServiceError> {
        Ok(self.get(key).await?.unwrap_or_else(|| default.to_string()))
    }

    /// Get a boolean setting. Missing or malformed values read as `default`.
    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool, SettingsServiceError> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(default))
    }

    /// Get an integer setting. Missing or malformed values read as `default`.
    pub async fn get_i64(&self, key: &str, default: i64) -> Result<i64, SettingsServiceError> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(default))
    }

    /// Whether new comments start out unapproved
    pub async fn comments_require_approval(&self) -> Result<bool, SettingsServiceError> {
        self.get_bool(keys::COMMENTS_REQUIRE_APPROVAL, false).await
    }

    /// List all settings
    pub async fn get_all(&self) -> Result<Vec<Setting>, SettingsServiceError> {
        self.repo
            .get_all()
            .await
            .context("Failed to list settings")
            .map_err(Into::into)
    }

    /// Set a setting value
    pub async fn set(&self, key: &str, value: &str) -> Result<(), SettingsServiceError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SettingsServiceError::ValidationError(
                "Setting key cannot be empty".to_string(),
            ));
        }
        self.repo
            .set(key, value)
            .await
            .context("Failed to set setting")
            .map_err(Into::into)
    }

    /// Seed default settings and the default category.
    ///
    /// Idempotent: existing keys and categories are left untouched, so this
    /// is safe to run on every start.
    pub async fn init_defaults(&self) -> Result<(), SettingsServiceError> {
        let defaults = [
            (keys::SITE_NAME, "Folio"),
            (keys::SITE_DESCRIPTION, "A Folio site"),
            (keys::POSTS_PER_PAGE, "20"),
            (keys::COMMENTS_PER_PAGE, "20"),
            (keys::COMMENTS_REQUIRE_APPROVAL, "false"),
        ];

        let mut seeded = 0;
        for (key, value) in defaults {
            if self
                .repo
                .set_if_absent(key, value)
                .await
                .context("Failed to seed setting")?
            {
                seeded += 1;
            }
        }
        if seeded > 0 {
            info!(seeded, "Seeded default settings");
        }

        if self
            .category_repo
            .get_by_name(DEFAULT_CATEGORY_NAME)
            .await
            .context("Failed to check default category")?
            .is_none()
        {
            let category = Category::new(
                DEFAULT_CATEGORY_NAME.to_string(),
                super::slug::slugify(DEFAULT_CATEGORY_NAME),
            );
            self.category_repo
                .create(&category)
                .await
                .context("Failed to create default category")?;
            info!(name = DEFAULT_CATEGORY_NAME, "Created default category");
        }

        Ok(())
    }
}
