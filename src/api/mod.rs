//! API layer - HTTP handlers and routing
//!
//! JSON API for posts, categories, tags, comments, auth and the admin
//! surface. Routes come in three rings: public (with optional auth so
//! members are recognized), protected (session required) and admin.

pub mod admin;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod common;
pub mod middleware;
pub mod posts;
pub mod responses;
pub mod tags;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .nest("/admin/categories", categories::admin_router())
        .nest("/admin/tags", tags::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/posts", posts::protected_router())
        .nest("/comments", comments::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let public_routes = Router::new()
        .nest("/posts", posts::public_router())
        .nest("/categories", categories::public_router())
        .nest("/tags", tags::public_router())
        .nest("/comments", comments::public_router())
        .nest("/auth", auth::public_router())
        .merge(posts::engagement_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    public_routes.merge(admin_routes).merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            cors_origin
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:3000")),
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use axum::http::HeaderName;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    fn client_ip(ip: &str) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_str(ip).unwrap(),
        )
    }

    async fn setup_server() -> TestServer {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let state = AppState::new(&pool);
        state
            .settings
            .init_defaults()
            .await
            .expect("Failed to seed defaults");

        TestServer::new(build_router(state, "http://localhost:3000"))
            .expect("Failed to start test server")
    }

    async fn register_and_login(server: &TestServer, username: &str) -> String {
        server
            .post("/api/v1/auth/register")
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "correct horse battery",
            }))
            .await
            .assert_status_ok();

        let login = server
            .post("/api/v1/auth/login")
            .json(&json!({
                "username": username,
                "password": "correct horse battery",
            }))
            .await;
        login.assert_status_ok();
        login.json::<Value>()["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let server = setup_server().await;
        let response = server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ok");
    }

    #[tokio::test]
    async fn test_publish_and_read_flow() {
        let server = setup_server().await;
        let token = register_and_login(&server, "admin").await;

        let created = server
            .post("/api/v1/posts")
            .authorization_bearer(&token)
            .json(&json!({
                "title": "Hello World",
                "content": "First post",
                "is_published": true,
                "tags": ["intro"],
            }))
            .await;
        created.assert_status_ok();
        let post = created.json::<Value>();
        assert_eq!(post["slug"], "hello-world");

        let fetched = server.get("/api/v1/posts/hello-world").await;
        fetched.assert_status_ok();
        assert_eq!(fetched.json::<Value>()["title"], "Hello World");

        let listed = server.get("/api/v1/posts").await;
        listed.assert_status_ok();
        assert_eq!(listed.json::<Value>()["total"], 1);
    }

    #[tokio::test]
    async fn test_posting_requires_auth() {
        let server = setup_server().await;
        let response = server
            .post("/api/v1/posts")
            .json(&json!({ "title": "Nope", "content": "Nope" }))
            .await;
        response.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn test_admin_surface_requires_admin() {
        let server = setup_server().await;
        // First registered user is the admin, second is a plain author
        let _admin = register_and_login(&server, "root").await;
        let author = register_and_login(&server, "author").await;

        let response = server
            .get("/api/v1/admin/comments/pending")
            .authorization_bearer(&author)
            .await;
        response.assert_status_forbidden();
    }

    #[tokio::test]
    async fn test_engagement_flow() {
        let server = setup_server().await;
        let token = register_and_login(&server, "admin").await;

        let created = server
            .post("/api/v1/posts")
            .authorization_bearer(&token)
            .json(&json!({
                "title": "Engaged",
                "content": "Body",
                "is_published": true,
            }))
            .await;
        let post_id = created.json::<Value>()["id"].as_i64().unwrap();

        // Anonymous view and rating, identified by IP
        server
            .post(&format!("/api/v1/view/{}", post_id))
            .add_header(client_ip("203.0.113.7").0, client_ip("203.0.113.7").1)
            .await
            .assert_status_ok();

        let rated = server
            .post(&format!("/api/v1/rate/{}", post_id))
            .add_header(client_ip("203.0.113.7").0, client_ip("203.0.113.7").1)
            .json(&json!({ "rating": 4 }))
            .await;
        rated.assert_status_ok();
        let body = rated.json::<Value>();
        assert_eq!(body["votes_count"], 1);
        assert_eq!(body["rating"], 4.0);

        // A guest comment on the post
        let comment = server
            .post("/api/v1/comments")
            .add_header(client_ip("203.0.113.7").0, client_ip("203.0.113.7").1)
            .json(&json!({
                "post_id": post_id,
                "guest_name": "Visitor",
                "content": "Nice one",
            }))
            .await;
        comment.assert_status_ok();
        let comment_id = comment.json::<Value>()["id"].as_i64().unwrap();

        let voted = server
            .post(&format!("/api/v1/comments/{}/vote", comment_id))
            .add_header(client_ip("203.0.113.8").0, client_ip("203.0.113.8").1)
            .json(&json!({ "vote": 1 }))
            .await;
        voted.assert_status_ok();
        assert_eq!(voted.json::<Value>()["likes_count"], 1);

        let threads = server
            .get(&format!("/api/v1/comments/post/{}", post_id))
            .await;
        threads.assert_status_ok();
        assert_eq!(threads.json::<Value>()["total"], 1);
    }

    #[tokio::test]
    async fn test_category_tree_endpoint() {
        let server = setup_server().await;
        let token = register_and_login(&server, "admin").await;

        let parent = server
            .post("/api/v1/admin/categories")
            .authorization_bearer(&token)
            .json(&json!({ "name": "Tech" }))
            .await;
        parent.assert_status_ok();
        let parent_id = parent.json::<Value>()["id"].as_i64().unwrap();

        server
            .post("/api/v1/admin/categories")
            .authorization_bearer(&token)
            .json(&json!({ "name": "Rust", "parent_id": parent_id }))
            .await
            .assert_status_ok();

        let tree = server.get("/api/v1/categories?tree=true").await;
        tree.assert_status_ok();
        let nodes = tree.json::<Value>();
        // The seeded "General" category plus "Tech"
        let tech = nodes
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["name"] == "Tech")
            .unwrap();
        assert_eq!(tech["children"][0]["name"], "Rust");
    }
}
