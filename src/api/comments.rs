//! Comment API endpoints

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::common::{extract_ip, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{MessageResponse, PagedResponse, VoteResponse};
use crate::models::CreateCommentInput;

/// Public comment routes (guest commenting and voting included)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_comment_handler))
        .route("/post/{post_id}", get(get_comments_handler))
        .route("/{id}/vote", post(vote_comment_handler))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/{id}", delete(delete_comment_handler))
}

async fn get_comments_handler(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(post_id): Path<i64>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // Only admins see unapproved comments in the thread view
    let include_unapproved = user.map(|Extension(u)| u.0.is_admin()).unwrap_or(false);

    let (threads, total) = state
        .comments
        .get_by_post(post_id, pagination.page, pagination.per_page, include_unapproved)
        .await?;

    Ok(Json(PagedResponse::from_parts(
        threads,
        total,
        pagination.page,
        pagination.per_page,
    )))
}

async fn create_comment_handler(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    headers: HeaderMap,
    Json(input): Json<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user.map(|Extension(u)| u.0);
    let comment = state
        .comments
        .create(input, user.as_ref(), extract_ip(&headers).as_deref())
        .await?;
    Ok(Json(comment))
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    /// +1 to like, -1 to dislike, 0 to retract
    vote: i32,
}

async fn vote_comment_handler(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.map(|Extension(u)| u.0.id);
    let (likes_count, dislikes_count) = state
        .comments
        .vote(id, user_id, extract_ip(&headers).as_deref(), req.vote)
        .await?;
    Ok(Json(VoteResponse {
        likes_count,
        dislikes_count,
    }))
}

async fn delete_comment_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.comments.delete(id, &user.0).await?;
    Ok(Json(MessageResponse::new("Comment deleted")))
}
