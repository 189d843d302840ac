//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The error type every action returns on failure
//! - Authentication (session token validation) and authorization (admin role)
//! - Extractors for the current user, the client IP and validated JSON bodies

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::SqlitePool;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use validator::Validate;

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxContactRepository, SqlxLikeRepository,
    SqlxPostRepository, SqlxSessionRepository, SqlxTagRepository, SqlxUserRepository,
};
use crate::models::User;
use crate::services::{
    validation_details, validation_message, CategoryService, CategoryServiceError,
    CommentService, CommentServiceError, ContactRateLimiter, ContactService, ContactServiceError,
    DraftService, LikeService, LikeServiceError, LoginRateLimiter, MediaClient, MediaError,
    OAuthError, OAuthService, PostService, PostServiceError, TagService, TagServiceError,
    UserService, UserServiceError,
};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Shown instead of the details of unexpected failures
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub cache: Arc<MemoryCache>,
    pub user_service: Arc<UserService>,
    pub oauth_service: Arc<OAuthService>,
    pub post_service: Arc<PostService>,
    pub draft_service: Arc<DraftService>,
    pub comment_service: Arc<CommentService>,
    pub like_service: Arc<LikeService>,
    pub category_service: Arc<CategoryService>,
    pub tag_service: Arc<TagService>,
    pub contact_service: Arc<ContactService>,
    pub media: Arc<MediaClient>,
    pub login_limiter: Arc<LoginRateLimiter>,
    pub contact_limiter: Arc<ContactRateLimiter>,
    pub templates: Arc<tera::Tera>,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn new(pool: SqlitePool, config: Config) -> anyhow::Result<Self> {
        let cache = crate::cache::create_cache(&config.cache);

        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let posts = SqlxPostRepository::boxed(pool.clone());
        let categories = SqlxCategoryRepository::boxed(pool.clone());
        let tags = SqlxTagRepository::boxed(pool.clone());
        let comments = SqlxCommentRepository::boxed(pool.clone());
        let likes = SqlxLikeRepository::boxed(pool.clone());
        let contacts = SqlxContactRepository::boxed(pool.clone());

        let media = MediaClient::new(config.media.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create media client: {}", e))?;
        let templates = crate::web::templates::load_templates(&config)?;

        Ok(Self {
            user_service: Arc::new(UserService::new(users, sessions, config.auth.session_days)),
            oauth_service: Arc::new(OAuthService::new(config.auth.clone(), &config.server.base_url)),
            post_service: Arc::new(PostService::new(
                posts.clone(),
                categories.clone(),
                likes.clone(),
                cache.clone(),
            )),
            draft_service: Arc::new(DraftService::new(posts.clone())),
            comment_service: Arc::new(CommentService::new(comments, posts.clone(), cache.clone())),
            like_service: Arc::new(LikeService::new(likes, posts, cache.clone())),
            category_service: Arc::new(CategoryService::new(categories, cache.clone())),
            tag_service: Arc::new(TagService::new(tags, cache.clone())),
            contact_service: Arc::new(ContactService::new(contacts)),
            media: Arc::new(media),
            login_limiter: Arc::new(LoginRateLimiter::new()),
            contact_limiter: Arc::new(ContactRateLimiter::new()),
            templates: Arc::new(templates),
            config: Arc::new(config),
            cache,
            pool,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by every API action.
///
/// Serializes as `{"success": false, "error": "...", "code": "...", "details"?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMITED",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    /// Log the cause and answer with a generic message
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", cause);
        Self::new("INTERNAL_ERROR", GENERIC_ERROR_MESSAGE)
    }

    /// Validation failure with per-field messages
    pub fn from_validation(errors: &validator::ValidationErrors) -> Self {
        let details = serde_json::to_value(validation_details(errors)).unwrap_or_default();
        Self::with_details("VALIDATION_ERROR", validation_message(errors), details)
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "VALIDATION_ERROR" | "PARENT_MISMATCH" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" | "DUPLICATE_TITLE" => StatusCode::CONFLICT,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            "UNSUPPORTED_MEDIA_TYPE" => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "MEDIA_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: &self.message,
            code: &self.code,
            details: self.details.as_ref(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(_) => ApiError::not_found("Post not found"),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::DuplicateTitle(title) => ApiError::new(
                "DUPLICATE_TITLE",
                format!("You already have a post titled \"{}\"", title),
            ),
            PostServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            PostServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CommentServiceError::ParentMismatch => ApiError::new(
                "PARENT_MISMATCH",
                "The comment you replied to belongs to another post",
            ),
            CommentServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            CommentServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<LikeServiceError> for ApiError {
    fn from(err: LikeServiceError) -> Self {
        match err {
            LikeServiceError::NotFound(_) => ApiError::not_found("Post not found"),
            LikeServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::DuplicateName(name) => {
                ApiError::conflict(format!("A category named \"{}\" already exists", name))
            }
            CategoryServiceError::DuplicateSlug(slug) => {
                ApiError::conflict(format!("The slug \"{}\" is already used", slug))
            }
            CategoryServiceError::NotFound(_) => ApiError::not_found("Category not found"),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::DuplicateName(name) => {
                ApiError::conflict(format!("A tag named \"{}\" already exists", name))
            }
            TagServiceError::DuplicateSlug(slug) => {
                ApiError::conflict(format!("The slug \"{}\" is already used", slug))
            }
            TagServiceError::NotFound(_) => ApiError::not_found("Tag not found"),
            TagServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TagServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ContactServiceError> for ApiError {
    fn from(err: ContactServiceError) -> Self {
        match err {
            ContactServiceError::NotFound(_) => ApiError::not_found("Message not found"),
            ContactServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ContactServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound(_) => ApiError::not_found("User not found"),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        let message = err.user_message();
        let code = match &err {
            MediaError::FileTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            MediaError::UnsupportedType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            MediaError::BadRequest { .. } => "VALIDATION_ERROR",
            MediaError::Config { .. } | MediaError::Auth { .. } => "MEDIA_UNAVAILABLE",
            MediaError::Network { .. }
            | MediaError::Timeout { .. }
            | MediaError::Server { .. }
            | MediaError::InvalidResponse { .. }
            | MediaError::RetriesExhausted { .. } => "UPSTREAM_ERROR",
        };
        if !matches!(code, "PAYLOAD_TOO_LARGE" | "UNSUPPORTED_MEDIA_TYPE" | "VALIDATION_ERROR") {
            tracing::error!("Media upload failed: {}", err);
        }
        ApiError::new(code, message)
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::UnknownProvider(p) | OAuthError::NotConfigured(p) => {
                ApiError::not_found(format!("Sign-in with {} is not available", p))
            }
            OAuthError::InvalidState => ApiError::validation_error(err.to_string()),
            OAuthError::MissingEmail => ApiError::validation_error(err.to_string()),
            OAuthError::Provider(_) => {
                tracing::warn!("OAuth provider error: {}", err);
                ApiError::new("UPSTREAM_ERROR", "The sign-in provider could not be reached")
            }
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// User attached by `optional_auth`, if the request carried a valid session
#[derive(Debug, Clone, Default)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

/// Session token from `Authorization: Bearer` or the session cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|c| c.trim().strip_prefix("session="))
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

/// `Set-Cookie` value for a new session
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> HeaderValue {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        max_age_secs,
        if secure { "; Secure" } else { "" }
    );
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear_session_cookie())
}

/// `Set-Cookie` value removing the session
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

async fn user_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, ApiError> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    Ok(state.user_service.validate_session(&token).await?)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = user_from_headers(&state, request.headers())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Please sign in to continue"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware; never rejects
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match user_from_headers(&state, request.headers()).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Session lookup failed: {}", e),
    }
    next.run(request).await
}

/// Admin authorization middleware; runs after `require_auth`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Please sign in to continue"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Please sign in to continue"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

// ============================================================================
// Client IP
// ============================================================================

/// Client address: proxy headers first, then the socket peer
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    };

    forwarded.or_else(real_ip).or_else(|| peer.map(|p| p.ip()))
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(client_ip(&parts.headers, peer)))
    }
}

// ============================================================================
// JSON bodies
// ============================================================================

/// JSON body whose rejections use the API error shape
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// JSON body that also passed its `validator` rules
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let JsonBody(value) = JsonBody::<T>::from_request(req, state).await?;
        value.validate().map_err(|e| ApiError::from_validation(&e))?;
        Ok(ValidatedJson(value))
    }
}
