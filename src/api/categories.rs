//! Category API endpoints
//!
//! Handles HTTP requests for categories:
//! - GET /api/categories - Categories with published post counts
//! - POST /api/admin/categories - Create a category
//! - PUT /api/admin/categories/{id} - Rename or edit a category
//! - DELETE /api/admin/categories/{id} - Delete a category; its posts stay

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Router,
};

use crate::api::middleware::{AppState, ValidatedJson};
use crate::api::posts::DeletedResponse;
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{Category, CategoryInput, CategoryWithCount};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories))
}

/// Routes mounted under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/categories", post(create_category))
        .route("/categories/{id}", put(update_category).delete(delete_category))
}

/// GET /api/categories - Categories with published post counts
async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<CategoryWithCount>> {
    let categories = state.category_service.list_with_counts().await?;
    Ok(ApiResponse::ok(categories))
}

/// POST /api/admin/categories - Create a category
async fn create_category(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CategoryInput>,
) -> ApiResult<Category> {
    let category = state.category_service.create(input).await?;
    Ok(ApiResponse::created(category))
}

/// PUT /api/admin/categories/{id} - Update a category
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidatedJson(input): ValidatedJson<CategoryInput>,
) -> ApiResult<Category> {
    let category = state.category_service.update(id, input).await?;
    Ok(ApiResponse::ok(category))
}

/// DELETE /api/admin/categories/{id} - Delete a category
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<DeletedResponse> {
    state.category_service.delete(id).await?;
    Ok(ApiResponse::ok(DeletedResponse { id }))
}
