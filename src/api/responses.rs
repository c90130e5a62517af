//! Shared API response types

use serde::Serialize;

use crate::models::{PagedResult, Session, User};

/// Simple acknowledgement body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Paginated list envelope
#[derive(Debug, Serialize)]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> PagedResponse<T> {
    pub fn new(result: PagedResult<T>, page: i64, per_page: i64) -> Self {
        Self {
            items: result.items,
            total: result.total,
            page,
            per_page,
        }
    }

    pub fn from_parts(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        Self {
            items,
            total,
            page,
            per_page,
        }
    }
}

/// Login response carrying the session token and its user
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub user: User,
}

impl LoginResponse {
    pub fn new(user: User, session: &Session) -> Self {
        Self {
            token: session.id.clone(),
            expires_at: session.expires_at,
            user,
        }
    }
}

/// Engagement snapshot returned after rating a post
#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub rating: f64,
    pub votes_count: i64,
}

/// Tally returned after voting on a comment
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub likes_count: i64,
    pub dislikes_count: i64,
}
