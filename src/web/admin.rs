//! Admin panel pages
//!
//! Tables and forms rendered on the server; the buttons call the
//! `/api/admin/*` actions from `app.js`. Anonymous visitors are sent to the
//! sign-in page, other users get a 403.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::Html,
    routing::get,
    Router,
};
use serde::Serialize;

use crate::api::admin::MessagesQuery;
use crate::api::common::{default_per_page, AdminListQuery, PostSearchQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::responses::StatsResponse;
use crate::models::{ListParams, PostDetail, ReadFilter, User};
use crate::web::{base_context, render, PageError};

/// Admin signed in through the session cookie
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl AdminUser {
    fn viewer(&self) -> MaybeUser {
        MaybeUser(Some(self.0.clone()))
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = PageError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthenticatedUser>() {
            None => Err(PageError::redirect("/login")),
            Some(AuthenticatedUser(user)) if user.is_admin() => Ok(AdminUser(user.clone())),
            Some(_) => Err(ApiError::forbidden("The admin panel is for administrators only").into()),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/posts", get(posts))
        .route("/admin/posts/new", get(new_post))
        .route("/admin/posts/{id}/edit", get(edit_post))
        .route("/admin/comments", get(comments))
        .route("/admin/users", get(users))
        .route("/admin/messages", get(messages))
        .route("/admin/taxonomy", get(taxonomy))
}

/// Number of comments on the dashboard
const RECENT_COMMENTS: u32 = 5;

/// GET /admin
async fn dashboard(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Html<String>, PageError> {
    let stats = StatsResponse {
        posts: state.post_service.counts().await?,
        comments: state.comment_service.count_all().await?,
        likes: state.like_service.count_all().await?,
        users: state.user_service.count().await?,
        unread_messages: state.contact_service.unread_count().await?,
    };
    let recent = state
        .comment_service
        .list_recent(None, &ListParams::new(1, RECENT_COMMENTS))
        .await?;

    let mut context = base_context(&state, &admin.viewer(), "/admin");
    context.insert("stats", &stats);
    context.insert("recent_comments", &recent.items);
    Ok(Html(render(&state, "admin/dashboard.html", &context)?))
}

/// GET /admin/posts - Every post, with the search filters
async fn posts(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<PostSearchQuery>,
) -> Result<Html<String>, PageError> {
    let filter = query.to_filter()?;
    let page = state
        .post_service
        .search(&filter, &query.params(default_per_page()))
        .await?;

    let mut context = base_context(&state, &admin.viewer(), "/admin/posts");
    context.insert("posts", &page);
    context.insert("q", query.q.as_deref().unwrap_or(""));
    context.insert("status", query.status.as_deref().unwrap_or(""));
    Ok(Html(render(&state, "admin/posts.html", &context)?))
}

/// Editor form state
#[derive(Debug, Default, Serialize)]
struct EditorContext {
    post: Option<PostDetail>,
    category_ids: Vec<i64>,
    /// Comma separated tag names
    tags: String,
}

impl From<PostDetail> for EditorContext {
    fn from(post: PostDetail) -> Self {
        let category_ids = post.summary.categories.iter().map(|c| c.id).collect();
        let tags = post
            .summary
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            post: Some(post),
            category_ids,
            tags,
        }
    }
}

async fn render_editor(
    state: &AppState,
    admin: &AdminUser,
    path: &str,
    editor: EditorContext,
) -> Result<Html<String>, PageError> {
    let mut context = base_context(state, &admin.viewer(), path);
    context.insert("editor", &editor);
    context.insert("categories", &state.category_service.list_with_counts().await?);
    Ok(Html(render(state, "admin/editor.html", &context)?))
}

/// GET /admin/posts/new
async fn new_post(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Html<String>, PageError> {
    render_editor(&state, &admin, "/admin/posts/new", EditorContext::default()).await
}

/// GET /admin/posts/{id}/edit
async fn edit_post(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Html<String>, PageError> {
    let post = state.post_service.get_for_edit(&admin.0, id).await?;
    let path = format!("/admin/posts/{}/edit", id);
    render_editor(&state, &admin, &path, EditorContext::from(post)).await
}

/// GET /admin/comments - Moderation queue
async fn comments(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<AdminListQuery>,
) -> Result<Html<String>, PageError> {
    let page = state
        .comment_service
        .list_recent(query.search(), &query.params())
        .await?;

    let mut context = base_context(&state, &admin.viewer(), "/admin/comments");
    context.insert("comments", &page);
    context.insert("q", query.search().unwrap_or(""));
    Ok(Html(render(&state, "admin/comments.html", &context)?))
}

/// GET /admin/users
async fn users(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<AdminListQuery>,
) -> Result<Html<String>, PageError> {
    let page = state.user_service.list(query.search(), &query.params()).await?;

    let mut context = base_context(&state, &admin.viewer(), "/admin/users");
    context.insert("users", &page);
    context.insert("q", query.search().unwrap_or(""));
    Ok(Html(render(&state, "admin/users.html", &context)?))
}

/// GET /admin/messages - Contact inbox
async fn messages(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<MessagesQuery>,
) -> Result<Html<String>, PageError> {
    let params = ListParams::new(query.page, query.per_page);
    let page = state.contact_service.list(query.filter, &params).await?;

    let mut context = base_context(&state, &admin.viewer(), "/admin/messages");
    context.insert("messages", &page);
    context.insert("filter", &query.filter);
    context.insert("filters", &[ReadFilter::All, ReadFilter::Unread, ReadFilter::Read]);
    context.insert("unread", &state.contact_service.unread_count().await?);
    Ok(Html(render(&state, "admin/messages.html", &context)?))
}

/// GET /admin/taxonomy - Categories and tags
async fn taxonomy(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Html<String>, PageError> {
    let mut context = base_context(&state, &admin.viewer(), "/admin/taxonomy");
    context.insert("categories", &state.category_service.list_with_counts().await?);
    context.insert("tags", &state.tag_service.list_with_counts().await?);
    Ok(Html(render(&state, "admin/taxonomy.html", &context)?))
}
