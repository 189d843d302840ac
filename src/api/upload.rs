//! Image upload endpoint
//!
//! - POST /api/upload - Upload an image to the CDN
//!
//! Accepts multipart/form-data with a single field named "file". The image is
//! checked locally, then sent to the CDN with retries.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{ApiResponse, ApiResult};
use crate::services::UploadedImage;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn protected_router(max_file_size: u64) -> Router<AppState> {
    let limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(limit))
}

/// POST /api/upload - Upload one image
async fn upload_image(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> ApiResult<UploadedImage> {
    if !state.media.is_configured() {
        return Err(ApiError::new(
            "MEDIA_UNAVAILABLE",
            "Image uploads are not available right now.",
        ));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = field.bytes().await.map_err(|e| {
            ApiError::new("PAYLOAD_TOO_LARGE", format!("Failed to read file: {}", e))
        })?;

        // Reject before spending a network round trip
        state.media.validate(&content_type, data.len() as u64)?;

        tracing::debug!(user_id = user.id, file_name = %file_name, "Image upload requested");
        let image = state
            .media
            .upload(&file_name, data.to_vec(), &content_type)
            .await?;
        return Ok(ApiResponse::created(image));
    }

    Err(ApiError::validation_error("No file provided"))
}
