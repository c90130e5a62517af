//! Category API endpoints

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::MessageResponse;
use crate::models::{CreateCategoryInput, UpdateCategoryInput};

/// Public category routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories_handler))
        .route("/{slug}", get(get_category_handler))
}

/// Routes behind `require_admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_category_handler))
        .route("/{id}", put(update_category_handler))
        .route("/{id}", delete(delete_category_handler))
}

#[derive(Debug, Deserialize)]
struct CategoryListQuery {
    /// Return the two-level tree instead of the flat list
    #[serde(default)]
    tree: bool,
    /// Include inactive categories (admin views)
    #[serde(default)]
    include_inactive: bool,
}

async fn list_categories_handler(
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let active_only = !query.include_inactive;
    if query.tree {
        Ok(Json(state.categories.get_tree(active_only).await?).into_response())
    } else {
        Ok(Json(state.categories.list(active_only).await?).into_response())
    }
}

async fn get_category_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .categories
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(Json(category))
}

async fn create_category_handler(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.categories.create(input).await?;
    Ok(Json(category))
}

async fn update_category_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.categories.update(id, input).await?;
    Ok(Json(category))
}

async fn delete_category_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.categories.delete(id).await?;
    Ok(Json(MessageResponse::new("Category deleted")))
}
