//! Tag service
//!
//! Tags are flat labels created on demand: attaching an unknown tag name
//! to a post creates it, reusing by name when it already exists.

use crate::db::repositories::TagRepository;
use crate::models::Tag;
use anyhow::{Context, Result};
use std::sync::Arc;

use super::slug::{assign_slug, SlugError};

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    /// Tag not found
    #[error("Tag not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SlugError> for TagServiceError {
    fn from(err: SlugError) -> Self {
        match err {
            SlugError::InvalidName(name) => {
                Self::ValidationError(format!("Cannot derive a slug from '{}'", name))
            }
            SlugError::Conflict(name) => {
                Self::ValidationError(format!("Could not assign a slug for '{}'", name))
            }
            SlugError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Tag service
pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    /// Create a new tag service
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Get an existing tag by name or create it with a fresh slug
    pub async fn get_or_create(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TagServiceError::ValidationError(
                "Tag name cannot be empty".to_string(),
            ));
        }

        if let Some(existing) = self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check existing tag")?
        {
            return Ok(existing);
        }

        let repo = self.repo.clone();
        let slug = assign_slug(name, move |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate, None).await }
        })
        .await?;

        self.repo
            .create(name, &slug)
            .await
            .context("Failed to create tag")
            .map_err(Into::into)
    }

    /// Resolve a list of tag names to tags, creating missing ones.
    /// Duplicate and empty names are skipped.
    pub async fn resolve_names(&self, names: &[String]) -> Result<Vec<Tag>, TagServiceError> {
        let mut tags: Vec<Tag> = Vec::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if tags.iter().any(|t| t.name.eq_ignore_ascii_case(name)) {
                continue;
            }
            tags.push(self.get_or_create(name).await?);
        }
        Ok(tags)
    }

    /// Get tag by slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>, TagServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get tag")
            .map_err(Into::into)
    }

    /// List tags, most used first
    pub async fn list(&self, limit: i64) -> Result<Vec<Tag>, TagServiceError> {
        self.repo
            .list(limit)
            .await
            .context("Failed to list tags")
            .map_err(Into::into)
    }

    /// List tags attached to at least one post, most used first
    pub async fn popular(&self, limit: i64) -> Result<Vec<Tag>, TagServiceError> {
        self.repo
            .popular(limit)
            .await
            .context("Failed to list popular tags")
            .map_err(Into::into)
    }

    /// Delete a tag
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete tag")?;
        if !deleted {
            return Err(TagServiceError::NotFound(format!("id {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxTagRepository;
    use crate::db::{create_test_pool, migrations};
    use sqlx::SqlitePool;

    async fn setup_test_service() -> (SqlitePool, TagService) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let service = TagService::new(SqlxTagRepository::boxed(pool.clone()));
        (pool, service)
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_by_name() {
        let (_pool, service) = setup_test_service().await;

        let first = service.get_or_create("Rust").await.unwrap();
        let second = service.get_or_create("Rust").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.slug, "rust");
    }

    #[tokio::test]
    async fn test_get_or_create_disambiguates_slug_collisions() {
        let (_pool, service) = setup_test_service().await;

        let a = service.get_or_create("My Tag").await.unwrap();
        let b = service.get_or_create("My  Tag").await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.slug, "my-tag");
        assert_eq!(b.slug, "my-tag-1");
    }

    #[tokio::test]
    async fn test_get_or_create_rejects_empty_name() {
        let (_pool, service) = setup_test_service().await;
        let result = service.get_or_create("   ").await;
        assert!(matches!(result, Err(TagServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_resolve_names_skips_duplicates() {
        let (_pool, service) = setup_test_service().await;

        let tags = service
            .resolve_names(&[
                "rust".to_string(),
                "Rust".to_string(),
                "".to_string(),
                "web".to_string(),
            ])
            .await
            .unwrap();

        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["rust", "web"]);
    }
}
