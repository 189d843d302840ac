//! Server-rendered pages
//!
//! Public pages, the OAuth sign-in flow and the admin panel, rendered with
//! the embedded Tera templates. Pages seen by anonymous visitors are kept in
//! the page cache until a mutation revalidates their path.

pub mod admin;
pub mod assets;
pub mod auth;
pub mod pages;
pub mod templates;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tera::Context;

use crate::api::middleware::{self, ApiError, AppState, MaybeUser};
use crate::api::responses::UserResponse;
use crate::cache::{page_key, CacheLayer};
use crate::services::{
    CategoryServiceError, CommentServiceError, ContactServiceError, LikeServiceError, OAuthError,
    PostServiceError, TagServiceError, UserServiceError,
};

/// Build the page router
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(pages::home))
        .route("/posts/{slug}", get(pages::post_page))
        .route("/categories/{slug}", get(pages::category_page))
        .route("/tags/{slug}", get(pages::tag_page))
        .route("/search", get(pages::search_page))
        .route("/contact", get(pages::contact_page))
        .route("/login", get(pages::login_page))
        .route("/auth/{provider}", get(auth::start_sign_in))
        .route("/auth/{provider}/callback", get(auth::finish_sign_in))
        .merge(admin::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .route("/static/{*path}", get(assets::serve_asset))
        .fallback(not_found_page)
}

async fn not_found_page() -> PageError {
    PageError::not_found()
}

/// `?page=` of paginated pages
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "crate::api::common::default_page")]
    pub page: u32,
}

/// Failure of a page handler, rendered as an HTML error page
#[derive(Debug)]
pub enum PageError {
    Status { status: StatusCode, message: String },
    Redirect(String),
}

impl PageError {
    pub fn not_found() -> Self {
        PageError::Status {
            status: StatusCode::NOT_FOUND,
            message: "The page you are looking for does not exist.".to_string(),
        }
    }

    pub fn redirect(to: impl Into<String>) -> Self {
        PageError::Redirect(to.into())
    }
}

impl From<ApiError> for PageError {
    fn from(err: ApiError) -> Self {
        PageError::Status {
            status: err.status(),
            message: err.message,
        }
    }
}

macro_rules! page_error_from {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for PageError {
                fn from(err: $error) -> Self {
                    PageError::from(ApiError::from(err))
                }
            }
        )*
    };
}

page_error_from!(
    PostServiceError,
    CommentServiceError,
    CategoryServiceError,
    TagServiceError,
    UserServiceError,
    ContactServiceError,
    LikeServiceError,
    OAuthError,
);

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::Redirect(to) => Redirect::to(&to).into_response(),
            PageError::Status { status, message } => {
                (status, Html(templates::render_error_page(status, &message))).into_response()
            }
        }
    }
}

/// Site settings shown by the layout
#[derive(Debug, Serialize)]
struct SiteContext<'a> {
    title: &'a str,
    description: &'a str,
}

/// Context every page starts from: site settings, viewer and sign-in options
pub fn base_context(state: &AppState, viewer: &MaybeUser, current_path: &str) -> Context {
    let mut context = Context::new();
    context.insert(
        "site",
        &SiteContext {
            title: &state.config.site.title,
            description: &state.config.site.description,
        },
    );
    context.insert("viewer", &viewer.user().map(UserResponse::from));
    context.insert("current_path", current_path);
    let providers: Vec<&str> = state
        .oauth_service
        .enabled_providers()
        .iter()
        .map(|p| p.as_str())
        .collect();
    context.insert("oauth_providers", &providers);
    context
}

/// Render a template; failures are logged and shown as a generic error
pub fn render(state: &AppState, template: &str, context: &Context) -> Result<String, PageError> {
    state.templates.render(template, context).map_err(|e| {
        PageError::from(ApiError::internal(format!(
            "rendering {} failed: {:?}",
            template, e
        )))
    })
}

/// Cached rendering of `path`, for anonymous visitors only
pub async fn cached_page(state: &AppState, viewer: &MaybeUser, path: &str) -> Option<Html<String>> {
    if viewer.user().is_some() {
        return None;
    }
    match state.cache.get::<String>(&page_key(path)).await {
        Ok(html) => html.map(Html),
        Err(e) => {
            tracing::warn!("Page cache read failed for {}: {}", path, e);
            None
        }
    }
}

/// Keep an anonymous rendering of `path` until it is revalidated.
///
/// Pages rendered for signed-in viewers are never stored.
pub async fn remember_page(
    state: &AppState,
    viewer: &MaybeUser,
    path: &str,
    html: String,
) -> Html<String> {
    if viewer.user().is_none() {
        if let Err(e) = state
            .cache
            .set(&page_key(path), &html, state.cache.default_ttl())
            .await
        {
            tracing::warn!("Page cache write failed for {}: {}", path, e);
        }
    }
    Html(html)
}

/// Path plus query string, the cache key of paginated pages
pub fn path_with_page(path: &str, page: u32) -> String {
    if page > 1 {
        format!("{}?page={}", path, page)
    } else {
        path.to_string()
    }
}
