//! Shared API response types
//!
//! Every successful action answers `{"success": true, "data": ...}`; the
//! failure shape lives with `ApiError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::repositories::PostCounts;
use crate::models::{User, UserRole};

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            status: StatusCode::OK,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Result type of API handlers
pub type ApiResult<T> = Result<ApiResponse<T>, crate::api::ApiError>;

/// Public view of a user; never carries the password hash
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub avatar_url: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.display_name(),
            avatar_url: user.avatar_url(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Number of rows a bulk action touched
#[derive(Debug, Serialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

/// Dashboard numbers
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub posts: PostCounts,
    pub comments: i64,
    pub likes: i64,
    pub users: i64,
    pub unread_messages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_success_envelope() {
        let response = ApiResponse::created(serde_json::json!({"id": 7})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "data": {"id": 7}}));
    }

    #[test]
    fn test_user_response_hides_password_hash() {
        let mut user = User::new("ada@example.com".into(), Some("Ada".into()), UserRole::Admin);
        user.password_hash = Some("$argon2id$secret".into());

        let json = serde_json::to_string(&UserResponse::from(&user)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"ADMIN\""));
    }
}
