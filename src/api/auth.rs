//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/auth/register - Register with email and password
//! - POST /api/auth/login - Credential login
//! - POST /api/auth/logout - End the session
//! - GET /api/auth/me - Current user
//!
//! The first registered user becomes the administrator.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::api::middleware::{
    clear_session_cookie, extract_session_token, session_cookie, ApiError, AppState,
    AuthenticatedUser, ClientIp, JsonBody,
};
use crate::api::responses::{ApiResponse, ApiResult, AuthResponse, UserResponse};
use crate::models::{Session, User};
use crate::services::{LoginInput, RegisterInput, UserServiceError};

/// Seconds a client is told to wait after hitting a login limit
const LOGIN_IP_RETRY_SECS: u64 = 60;
const LOGIN_ACCOUNT_RETRY_SECS: u64 = 15 * 60;

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_current_user))
}

/// Response carrying the session cookie
pub(crate) fn with_session(state: &AppState, user: &User, session: Session, created: bool) -> Response {
    let secure = state.config.server.base_url.starts_with("https://");
    let cookie = session_cookie(&session.id, session.max_age_secs(), secure);
    let body = AuthResponse {
        user: UserResponse::from(user),
        token: session.id,
        expires_at: session.expires_at,
    };
    let body = if created {
        ApiResponse::created(body)
    } else {
        ApiResponse::ok(body)
    };
    ([(header::SET_COOKIE, cookie)], body).into_response()
}

/// POST /api/auth/register - Register and sign in
async fn register(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> Result<Response, ApiError> {
    let user = state.user_service.register(input).await?;
    let session = state.user_service.start_session(user.id).await?;
    Ok(with_session(&state, &user, session, true))
}

/// POST /api/auth/login - Credential login
///
/// Limited to 10 requests per IP per minute and 5 failures per account per
/// 15 minutes.
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    JsonBody(input): JsonBody<LoginInput>,
) -> Result<Response, ApiError> {
    if let Some(ip) = ip {
        if !state.login_limiter.check_ip(ip).await {
            tracing::warn!(%ip, "Login IP rate limit exceeded");
            return Err(ApiError::rate_limited(
                "Too many requests. Please wait a minute and try again.",
                LOGIN_IP_RETRY_SECS,
            ));
        }
    }

    let email = input.email.clone();
    if state.login_limiter.is_account_limited(&email).await {
        tracing::warn!(email = %email, "Login account rate limit exceeded");
        return Err(ApiError::rate_limited(
            "Too many failed attempts. Please try again in 15 minutes.",
            LOGIN_ACCOUNT_RETRY_SECS,
        ));
    }

    match state.user_service.login(input).await {
        Ok((user, session)) => {
            state.login_limiter.clear_account(&email).await;
            tracing::info!(user_id = user.id, "User logged in");
            Ok(with_session(&state, &user, session, false))
        }
        Err(e @ UserServiceError::AuthenticationError(_)) => {
            state.login_limiter.record_failed_attempt(&email).await;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/auth/logout - End the session
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        ApiResponse::ok(serde_json::json!({ "logged_out": true })),
    )
        .into_response())
}

/// GET /api/auth/me - Current user
async fn get_current_user(AuthenticatedUser(user): AuthenticatedUser) -> ApiResult<UserResponse> {
    Ok(ApiResponse::ok(UserResponse::from(&user)))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{sign_up, test_server};
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let (server, _state) = test_server().await;
        let first = sign_up(&server, "first@example.com").await;
        let second = sign_up(&server, "second@example.com").await;

        let me: Value = server.get("/api/auth/me").authorization_bearer(&first).await.json();
        assert_eq!(me["data"]["role"], "ADMIN");
        let me: Value = server.get("/api/auth/me").authorization_bearer(&second).await.json();
        assert_eq!(me["data"]["role"], "USER");
        assert!(me["data"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_logout_ends_session() {
        let (server, _state) = test_server().await;
        sign_up(&server, "ada@example.com").await;

        let response = server
            .post("/api/auth/login")
            .json(&json!({"email": "ada@example.com", "password": "correct horse"}))
            .await;
        response.assert_status_ok();
        let cookie = response.header("set-cookie");
        assert!(cookie.to_str().unwrap().contains("HttpOnly"));
        let token = response.json::<Value>()["data"]["token"].as_str().unwrap().to_string();

        // The cookie works as well as the bearer header
        server
            .get("/api/auth/me")
            .add_header(
                HeaderName::from_static("cookie"),
                HeaderValue::from_str(&format!("session={}", token)).unwrap(),
            )
            .await
            .assert_status_ok();

        server
            .post("/api/auth/logout")
            .authorization_bearer(&token)
            .await
            .assert_status_ok();
        server
            .get("/api/auth/me")
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_failed_logins_are_rate_limited() {
        let (server, _state) = test_server().await;
        sign_up(&server, "ada@example.com").await;

        for _ in 0..5 {
            let response = server
                .post("/api/auth/login")
                .json(&json!({"email": "ada@example.com", "password": "wrong password"}))
                .await;
            response.assert_status(StatusCode::UNAUTHORIZED);
        }

        // Even the right password is refused until the window passes
        let response = server
            .post("/api/auth/login")
            .json(&json!({"email": "ADA@example.com", "password": "correct horse"}))
            .await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.json::<Value>()["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_a_conflict() {
        let (server, _state) = test_server().await;
        sign_up(&server, "ada@example.com").await;

        let response = server
            .post("/api/auth/register")
            .json(&json!({"email": "ada@example.com", "name": "Ada", "password": "correct horse"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let response = server
            .post("/api/auth/register")
            .json(&json!({"email": "bob@example.com", "name": "Bob", "password": "short"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
