//! Public pages
//!
//! - GET / - Featured and latest posts
//! - GET /posts/{slug} - A post with its comment thread
//! - GET /categories/{slug}, GET /tags/{slug} - Posts of a category or tag
//! - GET /search - Search form and results
//! - GET /contact - Contact form
//! - GET /login - Sign-in and registration forms

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::api::common::PostSearchQuery;
use crate::api::middleware::{AppState, MaybeUser};
use crate::models::{category_path, post_path, tag_path, ListParams, PostFilter};
use crate::services::MAX_COMMENT_DEPTH;
use crate::web::{
    base_context, cached_page, path_with_page, remember_page, render, PageError, PageQuery,
};

/// Number of featured posts on the home page
const FEATURED_COUNT: u32 = 3;

/// GET / - Home page
pub async fn home(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let path = path_with_page("/", query.page);
    if let Some(html) = cached_page(&state, &viewer, &path).await {
        return Ok(html);
    }

    let params = ListParams::new(query.page, state.config.site.posts_per_page);
    let posts = state
        .post_service
        .list_published(&PostFilter::default(), &params)
        .await?;
    let featured = if params.page == 1 {
        let filter = PostFilter {
            featured: Some(true),
            ..PostFilter::default()
        };
        state
            .post_service
            .list_published(&filter, &ListParams::new(1, FEATURED_COUNT))
            .await?
            .items
    } else {
        Vec::new()
    };

    let mut context = base_context(&state, &viewer, "/");
    context.insert("posts", &posts);
    context.insert("featured", &featured);
    let html = render(&state, "index.html", &context)?;
    Ok(remember_page(&state, &viewer, &path, html).await)
}

/// GET /posts/{slug} - A published post and its comments
pub async fn post_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> Result<Html<String>, PageError> {
    let path = post_path(&slug);
    if let Some(html) = cached_page(&state, &viewer, &path).await {
        return Ok(html);
    }

    let post = state
        .post_service
        .get_published_by_slug(&slug, viewer.user())
        .await?;
    let comments = state.comment_service.list_for_post(post.summary.id).await?;

    let mut context = base_context(&state, &viewer, &path);
    context.insert("post", &post);
    context.insert("comments", &comments);
    context.insert("max_depth", &MAX_COMMENT_DEPTH);
    let html = render(&state, "post.html", &context)?;
    Ok(remember_page(&state, &viewer, &path, html).await)
}

/// GET /categories/{slug} - Published posts of a category
pub async fn category_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let path = path_with_page(&category_path(&slug), query.page);
    if let Some(html) = cached_page(&state, &viewer, &path).await {
        return Ok(html);
    }

    let category = state
        .category_service
        .get_by_slug(&slug)
        .await?
        .ok_or_else(PageError::not_found)?;
    let filter = PostFilter {
        categories: vec![category.slug.clone()],
        ..PostFilter::default()
    };
    let params = ListParams::new(query.page, state.config.site.posts_per_page);
    let posts = state.post_service.list_published(&filter, &params).await?;

    let mut context = base_context(&state, &viewer, &category.path());
    context.insert("kind", "Category");
    context.insert("term_name", &category.name);
    context.insert("term_description", &category.description);
    context.insert("base_path", &category.path());
    context.insert("posts", &posts);
    let html = render(&state, "term.html", &context)?;
    Ok(remember_page(&state, &viewer, &path, html).await)
}

/// GET /tags/{slug} - Published posts with a tag
pub async fn tag_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let path = path_with_page(&tag_path(&slug), query.page);
    if let Some(html) = cached_page(&state, &viewer, &path).await {
        return Ok(html);
    }

    let tag = state
        .tag_service
        .get_by_slug(&slug)
        .await?
        .ok_or_else(PageError::not_found)?;
    let filter = PostFilter {
        tags: vec![tag.slug.clone()],
        ..PostFilter::default()
    };
    let params = ListParams::new(query.page, state.config.site.posts_per_page);
    let posts = state.post_service.list_published(&filter, &params).await?;

    let mut context = base_context(&state, &viewer, &tag.path());
    context.insert("kind", "Tag");
    context.insert("term_name", &tag.name);
    context.insert("term_description", &None::<String>);
    context.insert("base_path", &tag.path());
    context.insert("posts", &posts);
    let html = render(&state, "term.html", &context)?;
    Ok(remember_page(&state, &viewer, &path, html).await)
}

/// GET /search - Search form and results; never cached
pub async fn search_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<PostSearchQuery>,
) -> Result<Html<String>, PageError> {
    let mut context = base_context(&state, &viewer, "/search");
    context.insert("categories", &state.category_service.list_with_counts().await?);
    context.insert("tags", &state.tag_service.list_with_counts().await?);
    context.insert("query", &SearchEcho::from(&query));

    let params = query.params(state.config.site.posts_per_page);
    let outcome = match query.to_filter() {
        Ok(filter) => state
            .post_service
            .list_published(&filter, &params)
            .await
            .map_err(crate::api::ApiError::from),
        Err(e) => Err(e),
    };
    match outcome {
        Ok(results) => context.insert("results", &results),
        // Bad dates and reversed ranges are shown next to the form
        Err(e) if e.status().is_client_error() => context.insert("search_error", &e.message),
        Err(e) => return Err(e.into()),
    }

    Ok(Html(render(&state, "search.html", &context)?))
}

/// Search form values echoed back into the inputs
#[derive(Debug, serde::Serialize)]
struct SearchEcho<'a> {
    q: &'a str,
    category: &'a str,
    tag: &'a str,
    from: &'a str,
    to: &'a str,
    sort: &'a str,
    featured: bool,
}

impl<'a> From<&'a PostSearchQuery> for SearchEcho<'a> {
    fn from(query: &'a PostSearchQuery) -> Self {
        Self {
            q: query.q.as_deref().unwrap_or(""),
            category: query.category.as_deref().unwrap_or(""),
            tag: query.tag.as_deref().unwrap_or(""),
            from: query.from.as_deref().unwrap_or(""),
            to: query.to.as_deref().unwrap_or(""),
            sort: query.sort.as_deref().unwrap_or("latest"),
            featured: query.featured.unwrap_or(false),
        }
    }
}

/// GET /contact - Contact form
pub async fn contact_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
) -> Result<Html<String>, PageError> {
    if let Some(html) = cached_page(&state, &viewer, "/contact").await {
        return Ok(html);
    }
    let context = base_context(&state, &viewer, "/contact");
    let html = render(&state, "contact.html", &context)?;
    Ok(remember_page(&state, &viewer, "/contact", html).await)
}

/// GET /login - Sign-in page; signed-in viewers go home
pub async fn login_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
) -> Result<Response, PageError> {
    if viewer.user().is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let context = base_context(&state, &viewer, "/login");
    Ok(Html(render(&state, "login.html", &context)?).into_response())
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{publish_post, sign_up, test_server};
    use crate::cache::{page_key, CacheLayer};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_home_lists_published_posts_only() {
        let (server, _state) = test_server().await;
        let token = sign_up(&server, "ada@example.com").await;
        publish_post(&server, &token, "Visible Post").await;
        server
            .post("/api/posts")
            .authorization_bearer(&token)
            .json(&json!({"title": "Hidden Draft", "content": "<p>wip</p>"}))
            .await
            .assert_status(StatusCode::CREATED);

        let html = server.get("/").await.text();
        assert!(html.contains("Visible Post"));
        assert!(!html.contains("Hidden Draft"));
    }

    #[tokio::test]
    async fn test_post_page_renders_thread_and_is_revalidated() {
        let (server, state) = test_server().await;
        let token = sign_up(&server, "ada@example.com").await;
        let post_id = publish_post(&server, &token, "Threaded").await;

        let html = server.get("/posts/threaded").await.text();
        assert!(html.contains("Threaded"));
        assert!(state
            .cache
            .get::<String>(&page_key("/posts/threaded"))
            .await
            .unwrap()
            .is_some());

        server
            .post("/api/comments")
            .authorization_bearer(&token)
            .json(&json!({"post_id": post_id, "content": "First reply here"}))
            .await
            .assert_status(StatusCode::CREATED);

        let html = server.get("/posts/threaded").await.text();
        assert!(html.contains("First reply here"));
    }

    #[tokio::test]
    async fn test_signed_in_pages_are_not_cached() {
        let (server, state) = test_server().await;
        let token = sign_up(&server, "ada@example.com").await;

        server.get("/contact").authorization_bearer(&token).await.assert_status_ok();
        assert!(state.cache.get::<String>(&page_key("/contact")).await.unwrap().is_none());

        server.get("/contact").await.assert_status_ok();
        assert!(state.cache.get::<String>(&page_key("/contact")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_post_and_term_are_404() {
        let (server, _state) = test_server().await;
        server.get("/posts/nope").await.assert_status(StatusCode::NOT_FOUND);
        server.get("/categories/nope").await.assert_status(StatusCode::NOT_FOUND);
        server.get("/tags/nope").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_reports_reversed_range() {
        let (server, _state) = test_server().await;
        let response = server
            .get("/search")
            .add_query_param("from", "2024-02-01")
            .add_query_param("to", "2024-01-01")
            .await;
        response.assert_status_ok();
        assert!(response.text().contains("must not be after"));
    }

    #[tokio::test]
    async fn test_login_page_redirects_signed_in_viewers() {
        let (server, _state) = test_server().await;
        server.get("/login").await.assert_status_ok();

        let token = sign_up(&server, "ada@example.com").await;
        server
            .get("/login")
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }
}
