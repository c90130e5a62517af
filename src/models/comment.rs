//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment entity.
///
/// Comments form a thread through `parent_id`. `likes_count` and
/// `dislikes_count` are denormalized tallies of the `comment_votes` rows
/// for the comment; only the comment service writes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Unique identifier
    pub id: i64,
    /// Post this comment belongs to
    pub post_id: i64,
    /// Author user ID, None for guest comments
    pub author_id: Option<i64>,
    /// Display name for guest comments
    pub guest_name: Option<String>,
    /// Parent comment ID; None for top-level comments
    pub parent_id: Option<i64>,
    /// Comment body
    pub content: String,
    /// Whether the comment is visible to readers
    pub is_approved: bool,
    /// Whether the comment is pinned to the top of the thread
    pub is_pinned: bool,
    /// Number of +1 votes
    pub likes_count: i64,
    /// Number of -1 votes
    pub dislikes_count: i64,
    /// Source IP the comment was posted from
    #[serde(skip_serializing)]
    pub ip_address: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    /// Check if this is a top-level comment (no parent)
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A top-level comment with its full, unpaginated reply list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// Input for creating a comment
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub post_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub guest_name: Option<String>,
    pub content: String,
}
