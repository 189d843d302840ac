//! API layer - HTTP handlers and routing
//!
//! The JSON actions behind the forms and buttons of the site:
//! - Post API endpoints (search, CRUD, draft autosave)
//! - Comment and like API endpoints
//! - Category and tag API endpoints
//! - Auth API endpoints
//! - Contact form endpoint
//! - Image upload endpoint
//! - Admin API endpoints
//!
//! Every action answers `{"success": true, "data": ...}` or the error shape of
//! [`ApiError`].

pub mod admin;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod common;
pub mod contact;
pub mod middleware;
pub mod posts;
pub mod responses;
pub mod tags;
pub mod upload;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use middleware::{
    ApiError, AppState, AuthenticatedUser, ClientIp, JsonBody, MaybeUser, ValidatedJson,
};
pub use responses::{ApiResponse, ApiResult};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest(
            "/admin",
            admin::router()
                .merge(categories::admin_router())
                .merge(tags::admin_router()),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .merge(posts::protected_router())
        .merge(comments::protected_router())
        .merge(tags::protected_router())
        .merge(upload::protected_router(state.config.media.max_file_size))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes; the viewer is attached when a session is present
    Router::new()
        .merge(auth::public_router())
        .merge(posts::public_router())
        .merge(comments::public_router())
        .merge(categories::public_router())
        .merge(tags::public_router())
        .merge(contact::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .merge(admin_routes)
        .merge(protected_routes)
        .fallback(api_not_found)
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("No such endpoint")
}

/// CORS for cookie-authenticated requests from the configured origin
fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
            cors
        }
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .merge(crate::web::router(state.clone()))
        .layer(cors_layer(&state.config.server.cors_origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::Config;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    /// Password every test account signs up with
    pub const PASSWORD: &str = "correct horse";

    /// Full router over a fresh in-memory database
    pub async fn test_server() -> (TestServer, AppState) {
        let pool = crate::db::migrated_test_pool().await;
        let state = AppState::new(pool, Config::default()).unwrap();
        let server = TestServer::new(build_router(state.clone())).unwrap();
        (server, state)
    }

    /// Register an account and return its session token
    pub async fn sign_up(server: &TestServer, email: &str) -> String {
        let name = email.split('@').next().unwrap_or("someone");
        let body: Value = server
            .post("/api/auth/register")
            .json(&json!({"email": email, "name": name, "password": PASSWORD}))
            .await
            .json();
        body["data"]["token"].as_str().unwrap().to_string()
    }

    /// Create a published post and return its id
    pub async fn publish_post(server: &TestServer, token: &str, title: &str) -> i64 {
        let body: Value = server
            .post("/api/posts")
            .authorization_bearer(token)
            .json(&json!({
                "title": title,
                "content": format!("<p>{} body</p>", title),
                "status": "PUBLISHED",
            }))
            .await
            .json();
        body["data"]["id"].as_i64().unwrap()
    }
}
