//! Admin API endpoints
//!
//! Moderation queue, full post listings (drafts included) and the
//! site settings editor. Everything here sits behind `require_admin`.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{MessageResponse, PagedResponse};
use crate::models::PostListParams;

/// Admin routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_all_posts_handler))
        .route("/comments/pending", get(pending_comments_handler))
        .route("/comments/{id}/approve", put(approve_comment_handler))
        .route("/comments/{id}/pin", put(pin_comment_handler))
        .route("/settings", get(get_settings_handler))
        .route("/settings", put(update_settings_handler))
}

#[derive(Debug, Deserialize)]
struct AdminPostListQuery {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    per_page: Option<i64>,
    #[serde(default)]
    author_id: Option<i64>,
    #[serde(default)]
    search: Option<String>,
    /// Filter on publication state; absent means everything
    #[serde(default)]
    is_published: Option<bool>,
}

async fn list_all_posts_handler(
    State(state): State<AppState>,
    Query(query): Query<AdminPostListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PostListParams {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(20),
        category_id: None,
        tag_slug: None,
        author_id: query.author_id,
        search: query.search,
        is_published: query.is_published,
        is_featured: None,
    };
    let result = state.posts.list(&params).await?;
    Ok(Json(PagedResponse::new(result, params.page, params.per_page)))
}

async fn pending_comments_handler(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (comments, total) = state
        .comments
        .list_pending(pagination.page, pagination.per_page)
        .await?;
    Ok(Json(PagedResponse::from_parts(
        comments,
        total,
        pagination.page,
        pagination.per_page,
    )))
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    #[serde(default = "default_true")]
    approved: bool,
}

fn default_true() -> bool {
    true
}

async fn approve_comment_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ApproveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.comments.set_approved(id, req.approved).await?;
    Ok(Json(MessageResponse::new(if req.approved {
        "Comment approved"
    } else {
        "Comment unapproved"
    })))
}

#[derive(Debug, Deserialize)]
struct PinRequest {
    #[serde(default = "default_true")]
    pinned: bool,
}

async fn pin_comment_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<PinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.comments.set_pinned(id, req.pinned).await?;
    Ok(Json(MessageResponse::new(if req.pinned {
        "Comment pinned"
    } else {
        "Comment unpinned"
    })))
}

#[derive(Debug, Serialize)]
struct SettingsResponse {
    settings: BTreeMap<String, String>,
}

async fn get_settings_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state
        .settings
        .get_all()
        .await?
        .into_iter()
        .map(|s| (s.key, s.value))
        .collect();
    Ok(Json(SettingsResponse { settings }))
}

async fn update_settings_handler(
    State(state): State<AppState>,
    Json(updates): Json<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    for (key, value) in &updates {
        state.settings.set(key, value).await?;
    }
    Ok(Json(MessageResponse::new("Settings updated")))
}
