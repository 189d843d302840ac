//! Comment and like API endpoints
//!
//! - GET /api/posts/{id}/comments - Comment tree of a post; `?view=threads`
//!   returns top-level comments with their direct replies only
//! - POST /api/comments - Comment or reply
//! - DELETE /api/comments/{id} - Delete a comment and its replies
//! - GET /api/posts/{id}/like - Like count and the viewer's state
//! - POST /api/posts/{id}/like - Toggle the viewer's like

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{AppState, AuthenticatedUser, MaybeUser, ValidatedJson};
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{CommentInput, CommentNode, CommentThread, CommentWithAuthor, LikeState};

/// Result of deleting a comment
#[derive(Debug, Serialize)]
pub struct CommentDeletedResponse {
    pub id: i64,
    /// Page of the post the comment was on
    pub revalidated_path: String,
}

/// Shape of a comment listing
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentView {
    /// Nested replies down to the depth limit
    #[default]
    Tree,
    /// Top-level comments with their direct replies
    Threads,
}

#[derive(Debug, Deserialize)]
pub struct CommentListQuery {
    #[serde(default)]
    pub view: CommentView,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CommentListing {
    Tree(Vec<CommentNode>),
    Threads(Vec<CommentThread>),
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/posts/{post}/comments", get(list_comments))
        .route("/posts/{post}/like", get(like_state))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/comments", post(create_comment))
        .route("/comments/{id}", delete(delete_comment))
        .route("/posts/{post}/like", post(toggle_like))
}

/// GET /api/posts/{id}/comments - Comment tree, three levels deep
async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Query(query): Query<CommentListQuery>,
) -> ApiResult<CommentListing> {
    let listing = match query.view {
        CommentView::Tree => {
            CommentListing::Tree(state.comment_service.list_for_post(post_id).await?)
        }
        CommentView::Threads => CommentListing::Threads(
            state
                .comment_service
                .list_top_level_with_replies(post_id)
                .await?,
        ),
    };
    Ok(ApiResponse::ok(listing))
}

/// POST /api/comments - Comment on a post or reply to a comment
async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidatedJson(input): ValidatedJson<CommentInput>,
) -> ApiResult<CommentWithAuthor> {
    let comment = state.comment_service.create(&user, input).await?;
    Ok(ApiResponse::created(comment))
}

/// DELETE /api/comments/{id} - Delete a comment (author or admin)
async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<CommentDeletedResponse> {
    let revalidated_path = state.comment_service.delete(&user, id).await?;
    Ok(ApiResponse::ok(CommentDeletedResponse {
        id,
        revalidated_path,
    }))
}

/// GET /api/posts/{id}/like - Like count and whether the viewer liked the post
async fn like_state(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(post_id): Path<i64>,
) -> ApiResult<LikeState> {
    let like = state.like_service.state_for(viewer.user(), post_id).await?;
    Ok(ApiResponse::ok(like))
}

/// POST /api/posts/{id}/like - Toggle the viewer's like
async fn toggle_like(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(post_id): Path<i64>,
) -> ApiResult<LikeState> {
    let like = state.like_service.toggle(&user, post_id).await?;
    Ok(ApiResponse::ok(like))
}
