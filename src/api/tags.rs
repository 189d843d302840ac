//! Tag API endpoints
//!
//! Handles HTTP requests for tags:
//! - GET /api/tags - Tags with published post counts
//! - POST /api/tags/resolve - Existing or new tags for free-form editor input
//! - POST /api/admin/tags - Create a tag
//! - PUT /api/admin/tags/{id} - Rename a tag
//! - DELETE /api/admin/tags/{id} - Delete a tag

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

use crate::api::middleware::{AppState, JsonBody, ValidatedJson};
use crate::api::posts::DeletedResponse;
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{Tag, TagInput, TagWithCount};

/// Tag names typed into the post editor
#[derive(Debug, Deserialize)]
pub struct ResolveTagsRequest {
    pub names: Vec<String>,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/tags", get(list_tags))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/tags/resolve", post(resolve_tags))
}

/// Routes mounted under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/tags", post(create_tag))
        .route("/tags/{id}", put(update_tag).delete(delete_tag))
}

/// GET /api/tags - Tags with published post counts
async fn list_tags(State(state): State<AppState>) -> ApiResult<Vec<TagWithCount>> {
    let tags = state.tag_service.list_with_counts().await?;
    Ok(ApiResponse::ok(tags))
}

/// POST /api/tags/resolve - Find or create tags by name
async fn resolve_tags(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ResolveTagsRequest>,
) -> ApiResult<Vec<Tag>> {
    let tags = state.tag_service.find_or_create_many(&body.names).await?;
    Ok(ApiResponse::ok(tags))
}

/// POST /api/admin/tags - Create a tag
async fn create_tag(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<TagInput>,
) -> ApiResult<Tag> {
    let tag = state.tag_service.create(input).await?;
    Ok(ApiResponse::created(tag))
}

/// PUT /api/admin/tags/{id} - Update a tag
async fn update_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidatedJson(input): ValidatedJson<TagInput>,
) -> ApiResult<Tag> {
    let tag = state.tag_service.update(id, input).await?;
    Ok(ApiResponse::ok(tag))
}

/// DELETE /api/admin/tags/{id} - Delete a tag
async fn delete_tag(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<DeletedResponse> {
    state.tag_service.delete(id).await?;
    Ok(ApiResponse::ok(DeletedResponse { id }))
}
