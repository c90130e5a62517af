//! API middleware
//!
//! Shared application state, the JSON error envelope, and the
//! authentication/authorization middleware stack.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::models::User;
use crate::services::{
    CategoryService, CategoryServiceError, CommentService, CommentServiceError, PostService,
    PostServiceError, SettingsService, SettingsServiceError, TagService, TagServiceError,
    UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub posts: Arc<PostService>,
    pub categories: Arc<CategoryService>,
    pub tags: Arc<TagService>,
    pub comments: Arc<CommentService>,
    pub settings: Arc<SettingsService>,
}

impl AppState {
    /// Wire up the full service stack over a database pool
    pub fn new(pool: &sqlx::SqlitePool) -> Self {
        use crate::db::repositories::{
            SqlxCategoryRepository, SqlxCommentRepository, SqlxPostRepository,
            SqlxSessionRepository, SqlxSettingsRepository, SqlxTagRepository, SqlxUserRepository,
        };

        let tags = Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone())));
        let settings = Arc::new(SettingsService::new(
            SqlxSettingsRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
        ));

        Self {
            users: Arc::new(UserService::new(
                SqlxUserRepository::boxed(pool.clone()),
                SqlxSessionRepository::boxed(pool.clone()),
            )),
            posts: Arc::new(PostService::new(
                SqlxPostRepository::boxed(pool.clone()),
                SqlxCategoryRepository::boxed(pool.clone()),
                tags.clone(),
            )),
            categories: Arc::new(CategoryService::new(SqlxCategoryRepository::boxed(
                pool.clone(),
            ))),
            tags,
            comments: Arc::new(CommentService::new(
                SqlxCommentRepository::boxed(pool.clone()),
                SqlxPostRepository::boxed(pool.clone()),
                settings.clone(),
            )),
            settings,
        }
    }
}

/// Authenticated user extracted from the request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    error!(error = ?err, "Internal error");
    ApiError::internal_error("Internal server error")
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::UserExists(msg) => Self::conflict(msg),
            UserServiceError::SessionExpired => Self::unauthorized("Invalid or expired session"),
            UserServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(msg) => Self::not_found(format!("Post not found: {}", msg)),
            PostServiceError::ValidationError(msg) => Self::validation_error(msg),
            PostServiceError::PermissionDenied => Self::forbidden("Permission denied"),
            PostServiceError::InvalidCategory(id) => {
                Self::validation_error(format!("Category {} does not exist", id))
            }
            PostServiceError::UnidentifiedVoter => {
                Self::validation_error("Cannot identify the voter")
            }
            PostServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::NotFound(msg) => {
                Self::not_found(format!("Category not found: {}", msg))
            }
            CategoryServiceError::AlreadyExists(name) => {
                Self::conflict(format!("Category '{}' already exists", name))
            }
            CategoryServiceError::InvalidParent(msg) => Self::validation_error(msg),
            CategoryServiceError::ValidationError(msg) => Self::validation_error(msg),
            CategoryServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(msg) => Self::not_found(format!("Tag not found: {}", msg)),
            TagServiceError::ValidationError(msg) => Self::validation_error(msg),
            TagServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::NotFound(msg) => {
                Self::not_found(format!("Comment not found: {}", msg))
            }
            CommentServiceError::PostNotFound(msg) => {
                Self::not_found(format!("Post not found: {}", msg))
            }
            CommentServiceError::CommentsClosed => Self::forbidden("Comments are closed"),
            CommentServiceError::ValidationError(msg) => Self::validation_error(msg),
            CommentServiceError::PermissionDenied => Self::forbidden("Permission denied"),
            CommentServiceError::UnidentifiedVoter => {
                Self::validation_error("Cannot identify the voter")
            }
            CommentServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(err: SettingsServiceError) -> Self {
        match err {
            SettingsServiceError::ValidationError(msg) => Self::validation_error(msg),
            SettingsServiceError::InternalError(e) => internal(e),
        }
    }
}

/// Extract the session token from the Authorization header or cookie
fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state.users.authenticate(&token).await?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware. Attaches the user when a valid
/// session is presented, passes the request through either way.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(&request) {
        if let Ok(user) = state.users.authenticate(&token).await {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
    }
    next.run(request).await
}

/// Admin authorization middleware. Must run after `require_auth`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}
