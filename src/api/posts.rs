//! Post API endpoints

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::common::{extract_ip, extract_referer, extract_user_agent};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{MessageResponse, PagedResponse, RatingResponse};
use crate::models::{CreatePostInput, PostListParams, PostWithRelations, UpdatePostInput};

/// Public post routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts_handler))
        .route("/popular", get(popular_posts_handler))
        .route("/recent", get(recent_posts_handler))
        .route("/featured", get(featured_posts_handler))
        .route("/{id_or_slug}", get(get_post_handler))
}

/// Public engagement routes, mounted at the API root
pub fn engagement_router() -> Router<AppState> {
    Router::new()
        .route("/view/{post_id}", post(record_view_handler))
        .route("/rate/{post_id}", post(rate_post_handler))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_post_handler))
        .route("/{id_or_slug}", put(update_post_handler))
        .route("/{id_or_slug}", delete(delete_post_handler))
}

#[derive(Debug, Deserialize)]
struct PostListQuery {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    per_page: Option<i64>,
    #[serde(default)]
    category_id: Option<i64>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    featured: Option<bool>,
}

async fn list_posts_handler(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PostListParams {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(20),
        category_id: query.category_id,
        tag_slug: query.tag,
        author_id: None,
        search: query.search,
        // Readers only ever see published posts
        is_published: Some(true),
        is_featured: query.featured,
    };
    let result = state.posts.list(&params).await?;
    Ok(Json(PagedResponse::new(result, params.page, params.per_page)))
}

async fn get_post_handler(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(id_or_slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post: Option<PostWithRelations> = match id_or_slug.parse::<i64>() {
        Ok(id) => state.posts.get_by_id(id).await?,
        Err(_) => state.posts.get_by_slug(&id_or_slug).await?,
    };
    let post = post.ok_or_else(|| ApiError::not_found("Post not found"))?;

    // Drafts are only visible to their author and admins
    if !post.post.is_published {
        let visible = user
            .map(|Extension(u)| u.0.can_edit(post.post.author_id))
            .unwrap_or(false);
        if !visible {
            return Err(ApiError::not_found("Post not found"));
        }
    }

    Ok(Json(post))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    10
}

async fn popular_posts_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.posts.popular(query.limit.clamp(1, 50)).await?))
}

async fn recent_posts_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.posts.recent(query.limit.clamp(1, 50)).await?))
}

async fn featured_posts_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.posts.featured(query.limit.clamp(1, 50)).await?))
}

async fn record_view_handler(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(post_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.map(|Extension(u)| u.0.id);
    state
        .posts
        .record_view(
            post_id,
            user_id,
            extract_ip(&headers).as_deref(),
            extract_user_agent(&headers).as_deref(),
            extract_referer(&headers).as_deref(),
        )
        .await?;
    Ok(Json(MessageResponse::new("View recorded")))
}

#[derive(Debug, Deserialize)]
struct RateRequest {
    rating: i32,
}

async fn rate_post_handler(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(post_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<RateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.map(|Extension(u)| u.0.id);
    let (rating, votes_count) = state
        .posts
        .rate(post_id, user_id, extract_ip(&headers).as_deref(), req.rating)
        .await?;
    Ok(Json(RatingResponse {
        rating,
        votes_count,
    }))
}

async fn create_post_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(input): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.posts.create(input, &user.0).await?;
    Ok(Json(post))
}

async fn update_post_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.posts.update(id, input, &user.0).await?;
    Ok(Json(post))
}

async fn delete_post_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.posts.delete(id, &user.0).await?;
    Ok(Json(MessageResponse::new("Post deleted")))
}
