//! Category service
//!
//! Business logic for hierarchical categories: unique names, slug
//! assignment, parent validation with cycle detection, and the two-level
//! tree served to readers.

use crate::db::is_unique_violation;
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryNode, CreateCategoryInput, UpdateCategoryInput};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use super::slug::{assign_slug, SlugError, MAX_SLUG_ATTEMPTS};

/// Upper bound on the ancestor walk. A well-formed tree never gets close;
/// hitting it means the stored hierarchy already loops.
const MAX_ANCESTOR_DEPTH: usize = 100;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    /// Category not found
    #[error("Category not found: {0}")]
    NotFound(String),

    /// A category with this name already exists
    #[error("Category already exists: {0}")]
    AlreadyExists(String),

    /// The requested parent is missing or would create a cycle
    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SlugError> for CategoryServiceError {
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

/// Category service
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    /// Create a new category service
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    /// Create a category
    pub async fn create(
        &self,
        input: CreateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name cannot be empty".to_string(),
            ));
        }
        if self
            .repo
            .exists_by_name(&name, None)
            .await
            .context("Failed to check category name")?
        {
            return Err(CategoryServiceError::AlreadyExists(name));
        }
        if let Some(parent_id) = input.parent_id {
            self.check_parent(parent_id, None).await?;
        }

        // A concurrent writer can claim the slug between the availability
        // check and the insert; retry with a fresh scan.
        for attempt in 0..MAX_SLUG_ATTEMPTS {
            let repo = self.repo.clone();
            let slug = assign_slug(&name, move |candidate| {
                let repo = repo.clone();
                async move { repo.slug_exists(&candidate, None).await }
            })
            .await?;

            let mut category = Category::new(name.clone(), slug);
            category.description = input.description.clone();
            category.parent_id = input.parent_id;
            category.is_active = input.is_active.unwrap_or(true);
            category.show_in_menu = input.show_in_menu.unwrap_or(true);
            category.position = input.position.unwrap_or(0);

            match self.repo.create(&category).await {
                Ok(created) => return Ok(created),
                Err(e) if is_unique_violation(&e) => {
                    warn!(name = %name, attempt, "Category slug collision, retrying");
                    continue;
                }
                Err(e) => return Err(e.context("Failed to create category").into()),
            }
        }

        Err(SlugError::Conflict(name).into())
    }

    /// Get category by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")
            .map_err(Into::into)
    }

    /// Get category by slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, CategoryServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category")
            .map_err(Into::into)
    }

    /// List all categories flat, ordered by position then name
    pub async fn list(&self, active_only: bool) -> Result<Vec<Category>, CategoryServiceError> {
        self.repo
            .list(active_only)
            .await
            .context("Failed to list categories")
            .map_err(Into::into)
    }

    /// Get the category tree: roots with their direct children, both
    /// levels ordered by position then name.
    pub async fn get_tree(
        &self,
        active_only: bool,
    ) -> Result<Vec<CategoryNode>, CategoryServiceError> {
        let roots = self
            .repo
            .list_roots(active_only)
            .await
            .context("Failed to list root categories")?;

        let mut tree = Vec::with_capacity(roots.len());
        for root in roots {
            let children = self
                .repo
                .get_children(root.id, active_only)
                .await
                .context("Failed to get category children")?;
            tree.push(CategoryNode {
                category: root,
                children,
            });
        }
        Ok(tree)
    }

    /// Update a category. Renaming regenerates the slug; the category's
    /// own slug is excluded from the collision scan so an unchanged name
    /// keeps it.
    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to load category")?
            .ok_or_else(|| CategoryServiceError::NotFound(format!("id {}", id)))?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CategoryServiceError::ValidationError(
                    "Category name cannot be empty".to_string(),
                ));
            }
            if self
                .repo
                .exists_by_name(&name, Some(id))
                .await
                .context("Failed to check category name")?
            {
                return Err(CategoryServiceError::AlreadyExists(name));
            }
            if name != category.name {
                let repo = self.repo.clone();
                category.slug = assign_slug(&name, move |candidate| {
                    let repo = repo.clone();
                    async move { repo.slug_exists(&candidate, Some(id)).await }
                })
                .await?;
            }
            category.name = name;
        }
        if let Some(description) = input.description {
            category.description = description;
        }
        if let Some(parent_id) = input.parent_id {
            if let Some(parent_id) = parent_id {
                self.check_parent(parent_id, Some(id)).await?;
            }
            category.parent_id = parent_id;
        }
        if let Some(is_active) = input.is_active {
            category.is_active = is_active;
        }
        if let Some(show_in_menu) = input.show_in_menu {
            category.show_in_menu = show_in_menu;
        }
        if let Some(position) = input.position {
            category.position = position;
        }

        self.repo
            .update(&category)
            .await
            .context("Failed to update category")
            .map_err(Into::into)
    }

    /// Delete a category. Children are reparented one level up.
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete category")?;
        if !deleted {
            return Err(CategoryServiceError::NotFound(format!("id {}", id)));
        }
        Ok(())
    }

    /// Validate a prospective parent: it must exist, must not be the
    /// category itself, and must not be one of its descendants.
    async fn check_parent(
        &self,
        parent_id: i64,
        child_id: Option<i64>,
    ) -> Result<(), CategoryServiceError> {
        if child_id == Some(parent_id) {
            return Err(CategoryServiceError::InvalidParent(
                "Category cannot be its own parent".to_string(),
            ));
        }

        let mut current = Some(parent_id);
        for _ in 0..MAX_ANCESTOR_DEPTH {
            let Some(cursor) = current else {
                return Ok(());
            };
            let category = self
                .repo
                .get_by_id(cursor)
                .await
                .context("Failed to walk ancestors")?
                .ok_or_else(|| {
                    CategoryServiceError::InvalidParent(format!(
                        "Parent category {} does not exist",
                        cursor
                    ))
                })?;
            if child_id == Some(category.id) {
                return Err(CategoryServiceError::InvalidParent(
                    "Move would create a cycle".to_string(),
                ));
            }
            current = category.parent_id;
        }

        Err(CategoryServiceError::InvalidParent(
            "Category hierarchy is too deep".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::db::{create_test_pool, migrations};
    use sqlx::SqlitePool;

    async fn setup_test_service() -> (SqlitePool, CategoryService) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let service = CategoryService::new(SqlxCategoryRepository::boxed(pool.clone()));
        (pool, service)
    }

    #[tokio::test]
    async fn test_create_assigns_slug() {
        let (_pool, service) = setup_test_service().await;

        let category = service
            .create(CreateCategoryInput::new("Tech News"))
            .await
            .unwrap();
        assert_eq!(category.slug, "tech-news");
        assert!(category.is_root());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let (_pool, service) = setup_test_service().await;

        service.create(CreateCategoryInput::new("Tech")).await.unwrap();
        let result = service.create(CreateCategoryInput::new("Tech")).await;
        assert!(matches!(result, Err(CategoryServiceError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_missing_parent() {
        let (_pool, service) = setup_test_service().await;

        let result = service
            .create(CreateCategoryInput::new("Orphan").with_parent(999))
            .await;
        assert!(matches!(result, Err(CategoryServiceError::InvalidParent(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_cycle() {
        let (_pool, service) = setup_test_service().await;

        let root = service.create(CreateCategoryInput::new("Root")).await.unwrap();
        let child = service
            .create(CreateCategoryInput::new("Child").with_parent(root.id))
            .await
            .unwrap();
        let grandchild = service
            .create(CreateCategoryInput::new("Grandchild").with_parent(child.id))
            .await
            .unwrap();

        // Root under its own grandchild would loop
        let result = service
            .update(
                root.id,
                UpdateCategoryInput::new().with_parent(Some(grandchild.id)),
            )
            .await;
        assert!(matches!(result, Err(CategoryServiceError::InvalidParent(_))));

        // Self-parenting is rejected outright
        let result = service
            .update(root.id, UpdateCategoryInput::new().with_parent(Some(root.id)))
            .await;
        assert!(matches!(result, Err(CategoryServiceError::InvalidParent(_))));
    }

    #[tokio::test]
    async fn test_tree_orders_and_filters() {
        let (_pool, service) = setup_test_service().await;

        let news = service
            .create(CreateCategoryInput::new("News").with_position(2))
            .await
            .unwrap();
        let tech = service
            .create(CreateCategoryInput::new("Tech").with_position(1))
            .await
            .unwrap();
        service
            .create(CreateCategoryInput::new("Rust").with_parent(tech.id))
            .await
            .unwrap();
        service
            .create(
                CreateCategoryInput::new("Hidden")
                    .with_parent(tech.id)
                    .with_active(false),
            )
            .await
            .unwrap();

        let tree = service.get_tree(true).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.id, tech.id);
        assert_eq!(tree[1].category.id, news.id);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].name, "Rust");

        let full = service.get_tree(false).await.unwrap();
        assert_eq!(full[0].children.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_reparents_children() {
        let (_pool, service) = setup_test_service().await;

        let root = service.create(CreateCategoryInput::new("Root")).await.unwrap();
        let mid = service
            .create(CreateCategoryInput::new("Mid").with_parent(root.id))
            .await
            .unwrap();
        let leaf = service
            .create(CreateCategoryInput::new("Leaf").with_parent(mid.id))
            .await
            .unwrap();

        service.delete(mid.id).await.unwrap();

        let leaf = service.get_by_id(leaf.id).await.unwrap().unwrap();
        assert_eq!(leaf.parent_id, Some(root.id));
    }

    #[tokio::test]
    async fn test_update_regenerates_slug_on_rename() {
        let (_pool, service) = setup_test_service().await;

        let category = service.create(CreateCategoryInput::new("Old Name")).await.unwrap();
        let updated = service
            .update(category.id, UpdateCategoryInput::new().with_name("New Name"))
            .await
            .unwrap();

        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.slug, "new-name");

        // The category's own slug does not count as a collision, so an
        // update without a rename leaves it untouched.
        let same = service
            .update(
                updated.id,
                UpdateCategoryInput::new().with_name("New Name"),
            )
            .await
            .unwrap();
        assert_eq!(same.slug, "new-name");
    }
}
