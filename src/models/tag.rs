//! Tag model

use serde::{Deserialize, Serialize};

/// Tag entity.
///
/// Tags categorize posts across categories; `posts_count` is a
/// denormalized aggregate kept in step with the `post_tags` rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    /// Unique identifier
    pub id: i64,
    /// Tag name (unique)
    pub name: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Number of posts carrying this tag
    pub posts_count: i64,
}
