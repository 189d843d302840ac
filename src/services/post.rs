//! Post service
//!
//! Business logic for posts:
//! - Create and update with validation, unique slugs and derived excerpts
//! - One post title per author (case-insensitive)
//! - Publication rules for drafts, published and scheduled posts
//! - Public reads, search and the admin bulk actions
//! - Revalidating every cached page a change touches

use crate::cache::MemoryCache;
use crate::db::repositories::{CategoryRepository, LikeRepository, PostCounts, PostRepository};
use crate::models::{
    category_path, post_path, tag_path, ListParams, PagedResult, Post, PostDetail, PostFilter,
    PostInput, PostRecord, PostStatus, PostSummary, TagRef, User,
};
use crate::services::text::{generate_slug, make_excerpt, sanitize_html, strip_html, EXCERPT_LENGTH};
use crate::services::validation_message;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use validator::Validate;

/// Attempts at a numbered slug before falling back to a random suffix
const MAX_SLUG_SUFFIX: u32 = 100;

/// Longest accepted tag name
const MAX_TAG_LENGTH: usize = 60;

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The author already has a post with this title
    #[error("Duplicate title: {0}")]
    DuplicateTitle(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Validated values ready for the repository
struct PreparedPost {
    record: PostRecord,
    category_ids: Vec<i64>,
    tags: Vec<TagRef>,
    /// Category and tag pages the post appears on
    term_paths: Vec<String>,
}

/// Post service
pub struct PostService {
    post_repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    like_repo: Arc<dyn LikeRepository>,
    cache: Arc<MemoryCache>,
}

impl PostService {
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        like_repo: Arc<dyn LikeRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            post_repo,
            category_repo,
            like_repo,
            cache,
        }
    }

    /// Create a post with its categories and tags.
    ///
    /// The row and its links are written in one transaction.
    pub async fn create(&self, author: &User, input: PostInput) -> Result<Post, PostServiceError> {
        let prepared = self.prepare(author.id, None, input).await?;

        let post = self
            .post_repo
            .create(&prepared.record, &prepared.category_ids, &prepared.tags)
            .await?;

        self.revalidate(&[post.slug.as_str()], &prepared.term_paths).await;
        tracing::info!(post_id = post.id, slug = %post.slug, status = %post.status, "Post created");
        Ok(post)
    }

    /// Update a post; only its author or an admin may do so
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: PostInput,
    ) -> Result<Post, PostServiceError> {
        let existing = self.get_owned(actor, id).await?;
        let old_terms = self.term_paths_of(&[id]).await?;

        let prepared = self.prepare(existing.author_id, Some(&existing), input).await?;
        let post = self
            .post_repo
            .update(id, &prepared.record, &prepared.category_ids, &prepared.tags)
            .await?;

        let paths: Vec<String> = old_terms.into_iter().chain(prepared.term_paths).collect();
        self.revalidate(&[existing.slug.as_str(), post.slug.as_str()], &paths).await;
        tracing::info!(post_id = post.id, actor_id = actor.id, "Post updated");
        Ok(post)
    }

    /// Delete a post; comments, likes and links go with it
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), PostServiceError> {
        let post = self.get_owned(actor, id).await?;
        let term_paths = self.term_paths_of(&[id]).await?;

        if !self.post_repo.delete(id).await? {
            return Err(PostServiceError::NotFound(id.to_string()));
        }

        self.revalidate(&[post.slug.as_str()], &term_paths).await;
        tracing::info!(post_id = id, actor_id = actor.id, "Post deleted");
        Ok(())
    }

    /// Delete the listed posts, returning how many existed
    pub async fn bulk_delete(&self, ids: &[i64]) -> Result<u64, PostServiceError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let summaries = self.post_repo.get_summaries_by_ids(ids).await?;
        let deleted = self.post_repo.bulk_delete(ids).await?;

        self.revalidate_summaries(&summaries).await;
        tracing::info!(deleted, "Posts bulk deleted");
        Ok(deleted)
    }

    /// Set the status of the listed posts.
    ///
    /// Scheduling needs a date per post and goes through `update` instead.
    /// Publishing applies the same title and content rules as the editor, and
    /// nothing changes if any listed post fails them.
    pub async fn set_status(&self, ids: &[i64], status: PostStatus) -> Result<u64, PostServiceError> {
        if status == PostStatus::Scheduled {
            return Err(PostServiceError::ValidationError(
                "Scheduling requires a publication date; edit the post instead".to_string(),
            ));
        }
        if ids.is_empty() {
            return Ok(0);
        }
        if status == PostStatus::Published {
            for id in ids {
                if let Some(post) = self.post_repo.get_by_id(*id).await? {
                    self.check_publishable(&post).await?;
                }
            }
        }

        let updated = self.post_repo.set_status(ids, status).await?;
        let summaries = self.post_repo.get_summaries_by_ids(ids).await?;
        self.revalidate_summaries(&summaries).await;
        tracing::info!(updated, status = %status, "Post status changed");
        Ok(updated)
    }

    async fn check_publishable(&self, post: &Post) -> Result<(), PostServiceError> {
        let title = post.title.trim();
        if title.is_empty() || is_blank_html(&post.content) {
            return Err(PostServiceError::ValidationError(format!(
                "Post {} needs a title and content before it can be published",
                post.id
            )));
        }
        if self
            .post_repo
            .exists_title_for_author(post.author_id, title, Some(post.id))
            .await?
        {
            return Err(PostServiceError::DuplicateTitle(format!(
                "Post {} shares its title \"{}\" with another post by the same author",
                post.id, title
            )));
        }
        Ok(())
    }

    pub async fn set_featured(&self, id: i64, featured: bool) -> Result<(), PostServiceError> {
        let post = self
            .post_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))?;

        self.post_repo.set_featured(id, featured).await?;
        self.revalidate(&[post.slug.as_str()], &[]).await;
        Ok(())
    }

    /// A published post as the given viewer sees it
    pub async fn get_published_by_slug(
        &self,
        slug: &str,
        viewer: Option<&User>,
    ) -> Result<PostDetail, PostServiceError> {
        let mut detail = self
            .post_repo
            .get_detail_by_slug(slug)
            .await?
            .filter(|d| d.summary.status == PostStatus::Published)
            .ok_or_else(|| PostServiceError::NotFound(slug.to_string()))?;

        if let Some(user) = viewer {
            detail.liked_by_viewer = self.like_repo.exists(user.id, detail.summary.id).await?;
        }
        Ok(detail)
    }

    /// A post with its terms for the editor, whatever its status
    pub async fn get_for_edit(&self, actor: &User, id: i64) -> Result<PostDetail, PostServiceError> {
        let post = self.get_owned(actor, id).await?;
        self.post_repo
            .get_detail_by_slug(&post.slug)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Post>, PostServiceError> {
        Ok(self.post_repo.get_by_id(id).await?)
    }

    /// Published posts matching `filter`; the status in `filter` is ignored
    pub async fn list_published(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<PostSummary>, PostServiceError> {
        let filter = PostFilter {
            status: Some(PostStatus::Published),
            ..filter.clone()
        };
        self.search(&filter, params).await
    }

    /// Posts matching `filter` in any status
    pub async fn search(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<PostSummary>, PostServiceError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(PostServiceError::ValidationError(
                    "The start date must not be after the end date".to_string(),
                ));
            }
        }
        let (items, total) = self.post_repo.search(filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Publish scheduled posts whose time has come
    pub async fn publish_due_scheduled(&self, now: DateTime<Utc>) -> Result<usize, PostServiceError> {
        let slugs = self.post_repo.publish_due_scheduled(now).await?;
        if slugs.is_empty() {
            return Ok(0);
        }

        let slug_refs: Vec<&str> = slugs.iter().map(String::as_str).collect();
        self.revalidate(&slug_refs, &[]).await;
        // Term pages list published posts only
        self.cache.revalidate_prefix("/categories/").await;
        self.cache.revalidate_prefix("/tags/").await;
        tracing::info!(count = slugs.len(), "Published scheduled posts");
        Ok(slugs.len())
    }

    pub async fn counts(&self) -> Result<PostCounts, PostServiceError> {
        Ok(self.post_repo.counts().await?)
    }

    async fn get_owned(&self, actor: &User, id: i64) -> Result<Post, PostServiceError> {
        let post = self
            .post_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))?;

        if !actor.can_edit(post.author_id) {
            return Err(PostServiceError::Forbidden(
                "You can only modify your own posts".to_string(),
            ));
        }
        Ok(post)
    }

    /// Validate the editor input and derive the stored values
    async fn prepare(
        &self,
        author_id: i64,
        existing: Option<&Post>,
        input: PostInput,
    ) -> Result<PreparedPost, PostServiceError> {
        input
            .validate()
            .map_err(|e| PostServiceError::ValidationError(validation_message(&e)))?;

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(PostServiceError::ValidationError("Title is required".to_string()));
        }

        let content = sanitize_html(&input.content);
        if is_blank_html(&content) {
            return Err(PostServiceError::ValidationError("Content is required".to_string()));
        }

        let exclude_id = existing.map(|p| p.id);
        if self
            .post_repo
            .exists_title_for_author(author_id, &title, exclude_id)
            .await?
        {
            return Err(PostServiceError::DuplicateTitle(format!(
                "You already have a post titled \"{}\"",
                title
            )));
        }

        let slug = self.resolve_slug(&title, input.slug.as_deref(), existing).await?;

        let excerpt = match non_blank(input.excerpt) {
            Some(excerpt) => Some(excerpt),
            None => Some(make_excerpt(&content, EXCERPT_LENGTH)).filter(|e| !e.is_empty()),
        };

        let published_at = resolve_published_at(input.status, input.published_at, existing, Utc::now())?;

        let category_ids: Vec<i64> = input
            .category_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let categories = self.category_repo.get_by_ids(&category_ids).await?;
        if categories.len() != category_ids.len() {
            return Err(PostServiceError::ValidationError(
                "One or more selected categories do not exist".to_string(),
            ));
        }

        let tags = tag_refs(&input.tags)?;

        let term_paths = categories
            .iter()
            .map(|c| category_path(&c.slug))
            .chain(tags.iter().map(|t| tag_path(&t.slug)))
            .collect();

        Ok(PreparedPost {
            record: PostRecord {
                title,
                slug,
                content,
                excerpt,
                cover_image: non_blank(input.cover_image),
                status: input.status,
                featured: input.featured,
                published_at,
                author_id,
            },
            category_ids,
            tags,
            term_paths,
        })
    }

    /// Slug for the post: explicit, kept, or derived from the title.
    ///
    /// A post keeps its slug once it has been published so links stay valid.
    async fn resolve_slug(
        &self,
        title: &str,
        explicit: Option<&str>,
        existing: Option<&Post>,
    ) -> Result<String, PostServiceError> {
        let explicit = explicit.map(generate_slug).filter(|s| !s.is_empty());

        if let Some(post) = existing {
            match &explicit {
                Some(slug) if *slug == post.slug => return Ok(post.slug.clone()),
                None if post.published_at.is_some() => return Ok(post.slug.clone()),
                _ => {}
            }
        }

        let base = explicit.unwrap_or_else(|| generate_slug(title));
        Ok(unique_slug(self.post_repo.as_ref(), &base, existing.map(|p| p.id)).await?)
    }

    async fn term_paths_of(&self, ids: &[i64]) -> Result<Vec<String>, PostServiceError> {
        let summaries = self.post_repo.get_summaries_by_ids(ids).await?;
        Ok(summaries.iter().flat_map(term_paths_of_summary).collect())
    }

    async fn revalidate_summaries(&self, summaries: &[PostSummary]) {
        let slugs: Vec<&str> = summaries.iter().map(|s| s.slug.as_str()).collect();
        let terms: Vec<String> = summaries.iter().flat_map(term_paths_of_summary).collect();
        self.revalidate(&slugs, &terms).await;
    }

    /// Drop the home page, the given post pages and term pages
    async fn revalidate(&self, slugs: &[&str], term_paths: &[String]) {
        self.cache.revalidate_path("/").await;
        for slug in slugs {
            self.cache.revalidate_path(&post_path(slug)).await;
        }
        for path in term_paths.iter().collect::<BTreeSet<_>>() {
            self.cache.revalidate_path(path).await;
        }
        // Post counts per category and tag change with posts
        self.cache.invalidate_taxonomy().await;
    }
}

/// First free slug among `base`, `base-2`, `base-3`, ...
pub(crate) async fn unique_slug(
    repo: &dyn PostRepository,
    base: &str,
    exclude_id: Option<i64>,
) -> anyhow::Result<String> {
    let base = if base.is_empty() {
        format!("post-{}", short_id())
    } else {
        base.to_string()
    };

    if !repo.slug_exists(&base, exclude_id).await? {
        return Ok(base);
    }
    for n in 2..=MAX_SLUG_SUFFIX {
        let candidate = format!("{}-{}", base, n);
        if !repo.slug_exists(&candidate, exclude_id).await? {
            return Ok(candidate);
        }
    }
    Ok(format!("{}-{}", base, short_id()))
}

/// Eight hex characters of a fresh UUID
pub(crate) fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Editor HTML with no text and no image
pub(crate) fn is_blank_html(html: &str) -> bool {
    strip_html(html).is_empty() && !html.to_ascii_lowercase().contains("<img")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn term_paths_of_summary(summary: &PostSummary) -> Vec<String> {
    summary
        .categories
        .iter()
        .map(|c| category_path(&c.slug))
        .chain(summary.tags.iter().map(|t| tag_path(&t.slug)))
        .collect()
}

/// Publication time for the requested status.
///
/// Published posts keep their first publication time; scheduled posts need
/// a time in the future; drafts have none.
fn resolve_published_at(
    status: PostStatus,
    requested: Option<DateTime<Utc>>,
    existing: Option<&Post>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, PostServiceError> {
    match status {
        PostStatus::Draft => Ok(None),
        PostStatus::Published => {
            let previous = existing
                .filter(|p| p.status == PostStatus::Published)
                .and_then(|p| p.published_at);
            Ok(Some(previous.unwrap_or(now)))
        }
        PostStatus::Scheduled => match requested {
            Some(at) if at > now => Ok(Some(at)),
            Some(_) => Err(PostServiceError::ValidationError(
                "Scheduled posts need a publication date in the future".to_string(),
            )),
            None => Err(PostServiceError::ValidationError(
                "Scheduled posts need a publication date".to_string(),
            )),
        },
    }
}

/// Tag references from free-form names, deduplicated by slug
fn tag_refs(names: &[String]) -> Result<Vec<TagRef>, PostServiceError> {
    let mut seen = BTreeSet::new();
    let mut refs = Vec::new();

    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if name.chars().count() > MAX_TAG_LENGTH {
            return Err(PostServiceError::ValidationError(format!(
                "Tag names must be at most {} characters",
                MAX_TAG_LENGTH
            )));
        }
        let slug = generate_slug(name);
        if slug.is_empty() || !seen.insert(slug.clone()) {
            continue;
        }
        refs.push(TagRef {
            name: name.to_string(),
            slug,
        });
    }
    Ok(refs)
}
