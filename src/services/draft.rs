//! Draft autosave
//!
//! The editor posts its form every 30 seconds. A blank form is skipped
//! without touching the database; otherwise the draft row is created on the
//! first save and overwritten afterwards.

use crate::db::repositories::PostRepository;
use crate::models::{PostRecord, PostStatus, User};
use crate::services::post::{is_blank_html, short_id, unique_slug, PostServiceError};
use crate::services::text::{generate_slug, make_excerpt, sanitize_html, EXCERPT_LENGTH};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest title accepted by the editor
const MAX_TITLE_LENGTH: usize = 200;

/// Editor form as serialized by the autosave timer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftInput {
    /// Draft being edited; `None` before the first save
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl DraftInput {
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && is_blank_html(&self.content)
    }
}

/// Result of one autosave tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AutosaveOutcome {
    /// Nothing to save
    Skipped,
    Saved {
        post_id: i64,
        saved_at: DateTime<Utc>,
    },
}

pub struct DraftService {
    post_repo: Arc<dyn PostRepository>,
}

impl DraftService {
    pub fn new(post_repo: Arc<dyn PostRepository>) -> Self {
        Self { post_repo }
    }

    pub async fn autosave(
        &self,
        author: &User,
        input: DraftInput,
    ) -> Result<AutosaveOutcome, PostServiceError> {
        if input.is_blank() {
            return Ok(AutosaveOutcome::Skipped);
        }

        let title = input.title.trim();
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(PostServiceError::ValidationError(format!(
                "Title must be at most {} characters",
                MAX_TITLE_LENGTH
            )));
        }
        if !title.is_empty()
            && self
                .post_repo
                .exists_title_for_author(author.id, title, input.post_id)
                .await?
        {
            return Err(PostServiceError::DuplicateTitle(format!(
                "You already have a post titled \"{}\"",
                title
            )));
        }
        let content = sanitize_html(&input.content);
        let excerpt = Some(make_excerpt(&content, EXCERPT_LENGTH)).filter(|e| !e.is_empty());

        match input.post_id {
            Some(id) => {
                let post = self
                    .post_repo
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| PostServiceError::NotFound(id.to_string()))?;
                if post.author_id != author.id {
                    return Err(PostServiceError::Forbidden(
                        "You can only autosave your own drafts".to_string(),
                    ));
                }
                if post.status != PostStatus::Draft {
                    return Err(PostServiceError::ValidationError(
                        "Only drafts are autosaved; save the post to apply changes".to_string(),
                    ));
                }

                let saved_at = self
                    .post_repo
                    .update_draft(id, title, &content, excerpt.as_deref())
                    .await?;
                tracing::debug!(post_id = id, "Draft autosaved");
                Ok(AutosaveOutcome::Saved { post_id: id, saved_at })
            }
            None => {
                let base = match generate_slug(title) {
                    slug if slug.is_empty() => format!("draft-{}", short_id()),
                    slug => slug,
                };
                let slug = unique_slug(self.post_repo.as_ref(), &base, None).await?;

                let record = PostRecord {
                    title: title.to_string(),
                    slug,
                    content,
                    excerpt,
                    cover_image: None,
                    status: PostStatus::Draft,
                    featured: false,
                    published_at: None,
                    author_id: author.id,
                };
                let post = self.post_repo.create(&record, &[], &[]).await?;
                tracing::info!(post_id = post.id, "Draft created by autosave");
                Ok(AutosaveOutcome::Saved {
                    post_id: post.id,
                    saved_at: post.updated_at,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::{PostCounts, SqlxPostRepository, SqlxUserRepository, UserRepository};
    use crate::models::{ListParams, Post, PostDetail, PostFilter, PostSummary, TagRef, UserRole};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Repository that counts every call and fails it
    #[derive(Default)]
    struct CountingRepo {
        calls: AtomicUsize,
    }

    impl CountingRepo {
        fn hit<T>(&self) -> anyhow::Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("unexpected repository call"))
        }
    }

    #[async_trait]
    impl PostRepository for CountingRepo {
        async fn create(&self, _: &PostRecord, _: &[i64], _: &[TagRef]) -> anyhow::Result<Post> {
            self.hit()
        }
        async fn update(&self, _: i64, _: &PostRecord, _: &[i64], _: &[TagRef]) -> anyhow::Result<Post> {
            self.hit()
        }
        async fn update_draft(&self, _: i64, _: &str, _: &str, _: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
            self.hit()
        }
        async fn get_by_id(&self, _: i64) -> anyhow::Result<Option<Post>> {
            self.hit()
        }
        async fn get_by_slug(&self, _: &str) -> anyhow::Result<Option<Post>> {
            self.hit()
        }
        async fn get_detail_by_slug(&self, _: &str) -> anyhow::Result<Option<PostDetail>> {
            self.hit()
        }
        async fn get_summaries_by_ids(&self, _: &[i64]) -> anyhow::Result<Vec<PostSummary>> {
            self.hit()
        }
        async fn search(&self, _: &PostFilter, _: &ListParams) -> anyhow::Result<(Vec<PostSummary>, i64)> {
            self.hit()
        }
        async fn exists_title_for_author(&self, _: i64, _: &str, _: Option<i64>) -> anyhow::Result<bool> {
            self.hit()
        }
        async fn slug_exists(&self, _: &str, _: Option<i64>) -> anyhow::Result<bool> {
            self.hit()
        }
        async fn delete(&self, _: i64) -> anyhow::Result<bool> {
            self.hit()
        }
        async fn bulk_delete(&self, _: &[i64]) -> anyhow::Result<u64> {
            self.hit()
        }
        async fn set_status(&self, _: &[i64], _: PostStatus) -> anyhow::Result<u64> {
            self.hit()
        }
        async fn set_featured(&self, _: i64, _: bool) -> anyhow::Result<bool> {
            self.hit()
        }
        async fn publish_due_scheduled(&self, _: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
            self.hit()
        }
        async fn counts(&self) -> anyhow::Result<PostCounts> {
            self.hit()
        }
    }

    fn author(id: i64) -> User {
        let mut user = User::new("writer@example.com".into(), None, UserRole::User);
        user.id = id;
        user
    }

    #[tokio::test]
    async fn test_blank_draft_makes_no_repository_call() {
        let repo = Arc::new(CountingRepo::default());
        let service = DraftService::new(repo.clone());

        for input in [
            DraftInput::default(),
            DraftInput {
                post_id: Some(4),
                title: "   ".into(),
                content: "<p><br></p>".into(),
            },
        ] {
            let outcome = service.autosave(&author(1), input).await.unwrap();
            assert_eq!(outcome, AutosaveOutcome::Skipped);
        }
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);

        // A non-blank form does reach the repository
        let input = DraftInput {
            title: "Idea".into(),
            ..DraftInput::default()
        };
        assert!(service.autosave(&author(1), input).await.is_err());
        assert!(repo.calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_autosave_creates_then_updates_draft() {
        let pool = migrated_test_pool().await;
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("writer@example.com".into(), None, UserRole::User))
            .await
            .unwrap();
        let repo = SqlxPostRepository::boxed(pool.clone());
        let service = DraftService::new(repo.clone());

        let first = service
            .autosave(
                &user,
                DraftInput {
                    post_id: None,
                    title: String::new(),
                    content: "<p>Only a body so far</p>".into(),
                },
            )
            .await
            .unwrap();
        let AutosaveOutcome::Saved { post_id, .. } = first else {
            panic!("expected a save");
        };

        let draft = repo.get_by_id(post_id).await.unwrap().unwrap();
        assert!(draft.slug.starts_with("draft-"));
        assert_eq!(draft.status, PostStatus::Draft);

        let second = service
            .autosave(
                &user,
                DraftInput {
                    post_id: Some(post_id),
                    title: "Now titled".into(),
                    content: "<p>Longer body</p>".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(second, AutosaveOutcome::Saved { post_id: id, .. } if id == post_id));

        let draft = repo.get_by_id(post_id).await.unwrap().unwrap();
        assert_eq!(draft.title, "Now titled");
        assert_eq!(draft.content, "<p>Longer body</p>");
    }

    #[tokio::test]
    async fn test_autosave_refuses_foreign_and_published_posts() {
        let pool = migrated_test_pool().await;
        let users = SqlxUserRepository::new(pool.clone());
        let owner = users
            .create(&User::new("owner@example.com".into(), None, UserRole::User))
            .await
            .unwrap();
        let intruder = users
            .create(&User::new("intruder@example.com".into(), None, UserRole::User))
            .await
            .unwrap();
        let repo = SqlxPostRepository::boxed(pool.clone());
        let service = DraftService::new(repo.clone());

        let AutosaveOutcome::Saved { post_id, .. } = service
            .autosave(
                &owner,
                DraftInput {
                    post_id: None,
                    title: "Mine".into(),
                    content: String::new(),
                },
            )
            .await
            .unwrap()
        else {
            panic!("expected a save");
        };

        let foreign = DraftInput {
            post_id: Some(post_id),
            title: "Taken".into(),
            content: String::new(),
        };
        let err = service.autosave(&intruder, foreign).await.unwrap_err();
        assert!(matches!(err, PostServiceError::Forbidden(_)));

        repo.set_status(&[post_id], PostStatus::Published).await.unwrap();
        let late = DraftInput {
            post_id: Some(post_id),
            title: "Mine".into(),
            content: "<p>edit</p>".into(),
        };
        let err = service.autosave(&owner, late).await.unwrap_err();
        assert!(matches!(err, PostServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_autosave_rejects_duplicate_title() {
        let pool = migrated_test_pool().await;
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("twice@example.com".into(), None, UserRole::User))
            .await
            .unwrap();
        let service = DraftService::new(SqlxPostRepository::boxed(pool.clone()));
        let draft = |post_id| DraftInput {
            post_id,
            title: "Hello".into(),
            content: String::new(),
        };

        let AutosaveOutcome::Saved { post_id, .. } = service.autosave(&user, draft(None)).await.unwrap() else {
            panic!("expected a save");
        };
        // Saving the same draft again is not a duplicate
        assert!(service.autosave(&user, draft(Some(post_id))).await.is_ok());

        let err = service.autosave(&user, draft(None)).await.unwrap_err();
        assert!(matches!(err, PostServiceError::DuplicateTitle(_)));
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE title = 'Hello'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
