//! OAuth sign-in pages
//!
//! - GET /auth/{provider} - Redirect to the provider's consent page
//! - GET /auth/{provider}/callback - Finish sign-in and start a session

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::api::middleware::{session_cookie, AppState};
use crate::services::OAuthProvider;
use crate::web::PageError;

/// Query the provider sends back
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set when the user declined, e.g. `access_denied`
    #[serde(default)]
    pub error: Option<String>,
}

/// GET /auth/{provider}
pub async fn start_sign_in(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, PageError> {
    let provider: OAuthProvider = provider.parse()?;
    let url = state.oauth_service.authorize_url(provider)?;
    Ok(Redirect::to(&url))
}

/// GET /auth/{provider}/callback
pub async fn finish_sign_in(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, PageError> {
    let provider: OAuthProvider = provider.parse()?;

    if let Some(error) = query.error {
        tracing::info!(provider = %provider, error = %error, "OAuth sign-in declined");
        return Err(PageError::redirect("/login"));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(PageError::redirect("/login"));
    };

    let profile = state
        .oauth_service
        .complete(provider, &code, &oauth_state)
        .await?;
    let user = state.user_service.sign_in_oauth(&profile).await?;
    let session = state.user_service.start_session(user.id).await?;
    tracing::info!(user_id = user.id, provider = %provider, "User signed in");

    let secure = state.config.server.base_url.starts_with("https://");
    let cookie = session_cookie(&session.id, session.max_age_secs(), secure);
    let destination = if user.is_admin() { "/admin" } else { "/" };
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(destination)).into_response())
}

#[cfg(test)]
mod tests {
    use crate::api::middleware::AppState;
    use crate::config::Config;
    use axum::http::StatusCode;
    use axum_test::TestServer;

    async fn server_with(config: Config) -> TestServer {
        let pool = crate::db::migrated_test_pool().await;
        let state = AppState::new(pool, config).unwrap();
        TestServer::new(crate::api::build_router(state)).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_404() {
        let server = server_with(Config::default()).await;
        server.get("/auth/github").await.assert_status(StatusCode::NOT_FOUND);
        server.get("/auth/myspace").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_redirects_with_signed_state() {
        let mut config = Config::default();
        config.auth.secret = "test-secret".to_string();
        config.auth.github.client_id = "client-id".to_string();
        config.auth.github.client_secret = "client-secret".to_string();
        let server = server_with(config).await;

        let response = server.get("/auth/github").await;
        response.assert_status(StatusCode::SEE_OTHER);
        let location = response.header("location");
        let location = location.to_str().unwrap();
        assert!(location.starts_with("https://github.com/login/oauth/authorize?client_id=client-id"));
        assert!(location.contains("state="));
    }

    #[tokio::test]
    async fn test_callback_rejects_forged_state() {
        let mut config = Config::default();
        config.auth.secret = "test-secret".to_string();
        config.auth.google.client_id = "client-id".to_string();
        config.auth.google.client_secret = "client-secret".to_string();
        let server = server_with(config).await;

        server
            .get("/auth/google/callback")
            .add_query_param("code", "abc")
            .add_query_param("state", "forged")
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        // Declined consent goes back to the sign-in page
        server
            .get("/auth/google/callback")
            .add_query_param("error", "access_denied")
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }
}
