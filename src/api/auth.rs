//! Authentication API endpoints

use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{LoginResponse, MessageResponse};
use crate::models::CreateUserInput;

/// Routes that work without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
}

async fn register_handler(
    State(state): State<AppState>,
    Json(input): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.users.register(input).await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state.users.login(&req.username, &req.password).await?;

    let max_age = (session.expires_at - session.created_at).num_seconds();
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id, max_age
    );
    let body = LoginResponse::new(user, &session);

    Ok(([(SET_COOKIE, cookie)], Json(body)))
}

async fn logout_handler(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    // The middleware already validated the token, re-extract it to drop
    // the session row.
    if let Some(token) = session_token_from_headers(&headers) {
        state.users.logout(&token).await?;
    }

    let cookie = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0".to_string();
    Ok(([(SET_COOKIE, cookie)], Json(MessageResponse::new("Logged out"))))
}

async fn me_handler(
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(user.0))
}

fn session_token_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(auth) = auth.to_str() {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|c| c.trim().strip_prefix("session=").map(str::to_string))
        })
}
