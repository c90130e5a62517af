//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category entity representing a hierarchical category.
///
/// Categories support parent-child relationships for organizing posts into
/// a tree structure. `posts_count` is a denormalized aggregate kept in step
/// with the `post_categories` association rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Category name (unique)
    pub name: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Category description
    pub description: Option<String>,
    /// Parent category ID (for hierarchical structure)
    pub parent_id: Option<i64>,
    /// Whether the category is shown to readers
    pub is_active: bool,
    /// Whether the category appears in navigation menus
    pub show_in_menu: bool,
    /// Sort position within parent
    pub position: i32,
    /// Number of posts associated with this category
    pub posts_count: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Create a new Category with the given name and slug.
    ///
    /// The ID will be set to 0 and assigned by the database; optional fields
    /// start at their defaults and can be set on the value before insert.
    pub fn new(name: String, slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            name,
            slug,
            description: None,
            parent_id: None,
            is_active: true,
            show_in_menu: true,
            position: 0,
            posts_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if this is a root category (no parent)
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Category with its direct children, for tree responses.
///
/// List responses materialize one level of children under each root; the
/// underlying table supports arbitrary depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    /// The category itself
    #[serde(flatten)]
    pub category: Category,
    /// Direct child categories
    pub children: Vec<Category>,
}

/// Input for creating a new category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub show_in_menu: Option<bool>,
    #[serde(default)]
    pub position: Option<i32>,
}

impl CreateCategoryInput {
    /// Create an input with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the parent category
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the active flag
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    /// Set the sort position
    pub fn with_position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }
}

/// Input for updating a category. `None` fields are left unchanged;
/// `parent_id` uses a nested Option so "set to root" is expressible.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub parent_id: Option<Option<i64>>,
    pub is_active: Option<bool>,
    pub show_in_menu: Option<bool>,
    pub position: Option<i32>,
}

impl UpdateCategoryInput {
    /// Create an empty update input
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the parent ID
    pub fn with_parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the active flag
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }
}
