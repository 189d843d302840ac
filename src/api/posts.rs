//! Post API endpoints
//!
//! Handles HTTP requests for posts:
//! - GET /api/posts - Search published posts
//! - GET /api/posts/{slug} - Get a published post
//! - POST /api/posts - Create a post
//! - PUT /api/posts/{id} - Update a post
//! - DELETE /api/posts/{id} - Delete a post
//! - POST /api/drafts/autosave - Save the editor contents as a draft

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;

use crate::api::common::PostSearchQuery;
use crate::api::middleware::{
    ApiError, AppState, AuthenticatedUser, JsonBody, MaybeUser, ValidatedJson,
};
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{PagedResult, Post, PostDetail, PostInput, PostSummary};
use crate::services::{AutosaveOutcome, DraftInput};

/// Body of a deletion
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: i64,
}

/// Routes readable without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(search_posts))
        .route("/posts/{post}", get(get_post))
}

/// Routes requiring a session
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/{post}", axum::routing::put(update_post).delete(delete_post))
        .route("/drafts/autosave", post(autosave_draft))
}

/// GET /api/posts - Search published posts
///
/// Query: `q`, `category`, `tag` (comma separated slugs), `author`,
/// `featured`, `from`/`to` (inclusive `YYYY-MM-DD`), `sort`, `page`, `per_page`.
async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<PostSearchQuery>,
) -> ApiResult<PagedResult<PostSummary>> {
    let filter = query.to_filter()?;
    let params = query.params(state.config.site.posts_per_page);

    let page = state.post_service.list_published(&filter, &params).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/posts/{slug} - Get a published post
async fn get_post(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> ApiResult<PostDetail> {
    let detail = state
        .post_service
        .get_published_by_slug(&slug, viewer.user())
        .await?;
    Ok(ApiResponse::ok(detail))
}

/// POST /api/posts - Create a post
async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidatedJson(input): ValidatedJson<PostInput>,
) -> ApiResult<Post> {
    let post = state.post_service.create(&user, input).await?;
    Ok(ApiResponse::created(post))
}

/// PUT /api/posts/{id} - Update a post (author or admin)
async fn update_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ValidatedJson(input): ValidatedJson<PostInput>,
) -> ApiResult<Post> {
    let post = state.post_service.update(&user, id, input).await?;
    Ok(ApiResponse::ok(post))
}

/// DELETE /api/posts/{id} - Delete a post (author or admin)
async fn delete_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<DeletedResponse> {
    state.post_service.delete(&user, id).await?;
    Ok(ApiResponse::ok(DeletedResponse { id }))
}

/// POST /api/drafts/autosave - Save the editor contents as a draft
///
/// A blank editor is acknowledged without touching the database.
async fn autosave_draft(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    JsonBody(input): JsonBody<DraftInput>,
) -> Result<ApiResponse<AutosaveOutcome>, ApiError> {
    let outcome = state.draft_service.autosave(&user, input).await?;
    Ok(ApiResponse::ok(outcome))
}
