//! Admin API endpoints
//!
//! Every route here is mounted under `/api/admin` and requires an admin
//! session:
//! - GET /stats - Dashboard numbers
//! - GET /posts - Posts in any status, with the full search
//! - POST /posts/status - Publish or unpublish several posts
//! - POST /posts/bulk-delete - Delete several posts
//! - PUT /posts/{id}/featured - Feature or unfeature a post
//! - GET /comments - Recent comments with their post
//! - POST /comments/bulk-delete - Delete several comments and their replies
//! - GET /users - Users with post and comment counts
//! - PUT /users/{id}/role - Change a user's role
//! - DELETE /users/{id} - Delete a user and their content
//! - GET /messages - Contact messages, optionally only read or unread ones
//! - GET /messages/{id} - One message
//! - DELETE /messages/{id} - Delete a message
//! - POST /messages/read - Mark messages read or unread
//! - POST /messages/bulk-delete - Delete several messages

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::common::{
    default_page, default_per_page, AdminListQuery, IdsRequest, PostSearchQuery,
};
use crate::api::middleware::{AppState, AuthenticatedUser, JsonBody, ValidatedJson};
use crate::api::posts::DeletedResponse;
use crate::api::responses::{AffectedResponse, ApiResponse, ApiResult, StatsResponse, UserResponse};
use crate::cache::CacheLayer;
use crate::models::{
    AdminComment, BulkDeleteResult, Contact, ListParams, PagedResult, PostStatus, PostSummary,
    ReadFilter, UserRole, UserWithStats,
};

#[derive(Debug, Deserialize, Validate)]
pub struct PostStatusRequest {
    #[validate(length(max = 500, message = "At most 500 items can be changed at once"))]
    pub ids: Vec<i64>,
    pub status: PostStatus,
}

#[derive(Debug, Deserialize)]
pub struct FeaturedRequest {
    pub featured: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkReadRequest {
    #[validate(length(max = 500, message = "At most 500 items can be changed at once"))]
    pub ids: Vec<i64>,
    #[serde(default = "default_true")]
    pub is_read: bool,
}

fn default_true() -> bool {
    true
}

/// Inbox listing query
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub filter: ReadFilter,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Serialize)]
pub struct FeaturedResponse {
    pub id: i64,
    pub featured: bool,
}

/// Routes mounted under `/admin`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/posts", get(list_posts))
        .route("/posts/status", post(set_post_status))
        .route("/posts/bulk-delete", post(bulk_delete_posts))
        .route("/posts/{id}/featured", put(set_featured))
        .route("/comments", get(list_comments))
        .route("/comments/bulk-delete", post(bulk_delete_comments))
        .route("/users", get(list_users))
        .route("/users/{id}/role", put(change_role))
        .route("/users/{id}", axum::routing::delete(delete_user))
        .route("/messages", get(list_messages))
        .route("/messages/read", post(mark_messages_read))
        .route("/messages/bulk-delete", post(bulk_delete_messages))
        .route("/messages/{id}", get(get_message).delete(delete_message))
}

/// GET /api/admin/stats - Dashboard numbers
async fn get_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let stats = StatsResponse {
        posts: state.post_service.counts().await?,
        comments: state.comment_service.count_all().await?,
        likes: state.like_service.count_all().await?,
        users: state.user_service.count().await?,
        unread_messages: state.contact_service.unread_count().await?,
    };
    Ok(ApiResponse::ok(stats))
}

/// GET /api/admin/posts - Posts in any status
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostSearchQuery>,
) -> ApiResult<PagedResult<PostSummary>> {
    let filter = query.to_filter()?;
    let params = query.params(default_per_page());
    let page = state.post_service.search(&filter, &params).await?;
    Ok(ApiResponse::ok(page))
}

/// POST /api/admin/posts/status - Set the status of several posts
async fn set_post_status(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<PostStatusRequest>,
) -> ApiResult<AffectedResponse> {
    let affected = state.post_service.set_status(&body.ids, body.status).await?;
    Ok(ApiResponse::ok(AffectedResponse { affected }))
}

/// POST /api/admin/posts/bulk-delete - Delete several posts
async fn bulk_delete_posts(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<IdsRequest>,
) -> ApiResult<AffectedResponse> {
    let affected = state.post_service.bulk_delete(&body.ids).await?;
    Ok(ApiResponse::ok(AffectedResponse { affected }))
}

/// PUT /api/admin/posts/{id}/featured - Feature or unfeature a post
async fn set_featured(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<FeaturedRequest>,
) -> ApiResult<FeaturedResponse> {
    state.post_service.set_featured(id, body.featured).await?;
    Ok(ApiResponse::ok(FeaturedResponse {
        id,
        featured: body.featured,
    }))
}

/// GET /api/admin/comments - Recent comments, newest first
async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<PagedResult<AdminComment>> {
    let page = state
        .comment_service
        .list_recent(query.search(), &query.params())
        .await?;
    Ok(ApiResponse::ok(page))
}

/// POST /api/admin/comments/bulk-delete - Delete several comments
async fn bulk_delete_comments(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<IdsRequest>,
) -> ApiResult<BulkDeleteResult> {
    let result = state.comment_service.bulk_delete(&body.ids).await?;
    Ok(ApiResponse::ok(result))
}

/// GET /api/admin/users - Users with their activity counts
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<PagedResult<UserWithStats>> {
    let page = state.user_service.list(query.search(), &query.params()).await?;
    Ok(ApiResponse::ok(page))
}

/// PUT /api/admin/users/{id}/role - Change a user's role
async fn change_role(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<RoleRequest>,
) -> ApiResult<UserResponse> {
    let user = state.user_service.change_role(id, body.role).await?;
    Ok(ApiResponse::ok(UserResponse::from(&user)))
}

/// DELETE /api/admin/users/{id} - Delete a user
async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<DeletedResponse> {
    state.user_service.delete(&admin, id).await?;
    // Their posts and comments are gone with them
    if let Err(e) = state.cache.clear().await {
        tracing::warn!("Failed to clear page cache: {}", e);
    }
    Ok(ApiResponse::ok(DeletedResponse { id }))
}

/// GET /api/admin/messages - Contact messages, newest first
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<PagedResult<Contact>> {
    let params = ListParams::new(query.page, query.per_page);
    let page = state.contact_service.list(query.filter, &params).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/admin/messages/{id} - One message
async fn get_message(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Contact> {
    let message = state.contact_service.get(id).await?;
    Ok(ApiResponse::ok(message))
}

/// DELETE /api/admin/messages/{id} - Delete a message
async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<DeletedResponse> {
    state.contact_service.delete(id).await?;
    Ok(ApiResponse::ok(DeletedResponse { id }))
}

/// POST /api/admin/messages/read - Mark messages read or unread
async fn mark_messages_read(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<MarkReadRequest>,
) -> ApiResult<AffectedResponse> {
    let affected = state.contact_service.mark_read(&body.ids, body.is_read).await?;
    Ok(ApiResponse::ok(AffectedResponse { affected }))
}

/// POST /api/admin/messages/bulk-delete - Delete several messages
async fn bulk_delete_messages(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<IdsRequest>,
) -> ApiResult<AffectedResponse> {
    let affected = state.contact_service.bulk_delete(&body.ids).await?;
    Ok(ApiResponse::ok(AffectedResponse { affected }))
}
