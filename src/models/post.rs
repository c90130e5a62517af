//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Post entity, the main content type.
///
/// The engagement counters (`views_count`, `comments_count`, `rating`,
/// `votes_count`) are denormalized aggregates; they are only ever written by
/// the post and comment services so they stay consistent with the underlying
/// view/rating/comment rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier
    pub id: i64,
    /// Post title
    pub title: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Short summary shown in listings
    pub excerpt: Option<String>,
    /// Full post body
    pub content: String,
    /// Author user ID
    pub author_id: i64,
    /// Whether the post is visible to readers
    pub is_published: bool,
    /// Whether the post is featured on the front page
    pub is_featured: bool,
    /// Whether the post is pinned to the top of listings
    pub is_pinned: bool,
    /// Whether readers may comment
    pub allow_comments: bool,
    /// When the post was published
    pub published_at: Option<DateTime<Utc>>,
    /// Total number of recorded views (no deduplication)
    pub views_count: i64,
    /// Number of approved comments
    pub comments_count: i64,
    /// Arithmetic mean of all rating rows, 0 when unrated
    pub rating: f64,
    /// Number of rating rows
    pub votes_count: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Post with its category and tag associations loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithRelations {
    #[serde(flatten)]
    pub post: Post,
    pub categories: Vec<super::Category>,
    pub tags: Vec<super::Tag>,
}

/// Input for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default = "default_allow_comments")]
    pub allow_comments: bool,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_allow_comments() -> bool {
    true
}

/// Input for updating a post. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub excerpt: Option<Option<String>>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
    pub is_featured: Option<bool>,
    pub is_pinned: Option<bool>,
    pub allow_comments: Option<bool>,
    pub category_ids: Option<Vec<i64>>,
    pub tags: Option<Vec<String>>,
}

/// Filters and paging for post listings
#[derive(Debug, Clone)]
pub struct PostListParams {
    pub page: i64,
    pub per_page: i64,
    pub category_id: Option<i64>,
    pub tag_slug: Option<String>,
    pub author_id: Option<i64>,
    pub search: Option<String>,
    /// `Some(true)` for published only, `None` for all
    pub is_published: Option<bool>,
    pub is_featured: Option<bool>,
}

impl Default for PostListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            category_id: None,
            tag_slug: None,
            author_id: None,
            search: None,
            is_published: Some(true),
            is_featured: None,
        }
    }
}

/// A page of results with the total row count
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
}
