//! Tag API endpoints

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::MessageResponse;

/// Public tag routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags_handler))
        .route("/popular", get(popular_tags_handler))
        .route("/{slug}", get(get_tag_handler))
}

/// Routes behind `require_admin`
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/{id}", delete(delete_tag_handler))
}

#[derive(Debug, Deserialize)]
struct TagListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

async fn list_tags_handler(
    State(state): State<AppState>,
    Query(query): Query<TagListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tags.list(query.limit.clamp(1, 500)).await?))
}

async fn popular_tags_handler(
    State(state): State<AppState>,
    Query(query): Query<TagListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tags.popular(query.limit.clamp(1, 500)).await?))
}

async fn get_tag_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state
        .tags
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag not found"))?;
    Ok(Json(tag))
}

async fn delete_tag_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.tags.delete(id).await?;
    Ok(Json(MessageResponse::new("Tag deleted")))
}
