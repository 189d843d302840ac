//! Like service

use crate::cache::MemoryCache;
use crate::db::repositories::{LikeRepository, PostRepository};
use crate::models::{LikeState, Post, PostStatus, User};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LikeServiceError {
    #[error("Post not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct LikeService {
    like_repo: Arc<dyn LikeRepository>,
    post_repo: Arc<dyn PostRepository>,
    cache: Arc<MemoryCache>,
}

impl LikeService {
    pub fn new(
        like_repo: Arc<dyn LikeRepository>,
        post_repo: Arc<dyn PostRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            like_repo,
            post_repo,
            cache,
        }
    }

    /// Like the post if the user has not, unlike it otherwise
    pub async fn toggle(&self, user: &User, post_id: i64) -> Result<LikeState, LikeServiceError> {
        let post = self.published_post(post_id).await?;
        let state = self.like_repo.toggle(user.id, post_id).await?;

        self.cache.revalidate_path(&post.path()).await;
        tracing::debug!(user_id = user.id, post_id, liked = state.liked, "Like toggled");
        Ok(state)
    }

    /// Like count, and whether `user` liked the post
    pub async fn state_for(
        &self,
        user: Option<&User>,
        post_id: i64,
    ) -> Result<LikeState, LikeServiceError> {
        self.published_post(post_id).await?;
        let liked = match user {
            Some(user) => self.like_repo.exists(user.id, post_id).await?,
            None => false,
        };
        Ok(LikeState {
            liked,
            like_count: self.like_repo.count_for_post(post_id).await?,
        })
    }

    pub async fn count_all(&self) -> Result<i64, LikeServiceError> {
        Ok(self.like_repo.count_all().await?)
    }

    async fn published_post(&self, post_id: i64) -> Result<Post, LikeServiceError> {
        self.post_repo
            .get_by_id(post_id)
            .await?
            .filter(|p| p.status == PostStatus::Published)
            .ok_or(LikeServiceError::NotFound(post_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::{
        SqlxLikeRepository, SqlxPostRepository, SqlxUserRepository, UserRepository,
    };
    use crate::models::{PostRecord, UserRole};
    use chrono::Utc;

    async fn setup() -> (LikeService, Arc<dyn PostRepository>, User, User) {
        let pool = migrated_test_pool().await;
        let users = SqlxUserRepository::new(pool.clone());
        let ada = users
            .create(&User::new("ada@example.com".into(), None, UserRole::User))
            .await
            .unwrap();
        let bob = users
            .create(&User::new("bob@example.com".into(), None, UserRole::User))
            .await
            .unwrap();
        let posts = SqlxPostRepository::boxed(pool.clone());
        let service = LikeService::new(
            SqlxLikeRepository::boxed(pool),
            posts.clone(),
            crate::cache::create_cache(&CacheConfig::default()),
        );
        (service, posts, ada, bob)
    }

    async fn post(posts: &Arc<dyn PostRepository>, author: &User, status: PostStatus) -> i64 {
        let record = PostRecord {
            title: format!("{} post", status),
            slug: format!("{}-post", status.as_str().to_lowercase()),
            content: "<p>x</p>".into(),
            excerpt: None,
            cover_image: None,
            status,
            featured: false,
            published_at: Some(Utc::now()),
            author_id: author.id,
        };
        posts.create(&record, &[], &[]).await.unwrap().id
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let (service, posts, ada, bob) = setup().await;
        let post_id = post(&posts, &ada, PostStatus::Published).await;

        // Someone else's like must survive
        service.toggle(&bob, post_id).await.unwrap();
        let before = service.state_for(Some(&ada), post_id).await.unwrap();
        assert_eq!(before, LikeState { liked: false, like_count: 1 });

        let liked = service.toggle(&ada, post_id).await.unwrap();
        assert_eq!(liked, LikeState { liked: true, like_count: 2 });

        let after = service.toggle(&ada, post_id).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(service.state_for(None, post_id).await.unwrap().like_count, 1);
        assert_eq!(service.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cannot_like_unpublished_post() {
        let (service, posts, ada, _) = setup().await;
        let draft = post(&posts, &ada, PostStatus::Draft).await;

        assert!(matches!(
            service.toggle(&ada, draft).await,
            Err(LikeServiceError::NotFound(id)) if id == draft
        ));
        assert!(matches!(
            service.toggle(&ada, 404).await,
            Err(LikeServiceError::NotFound(404))
        ));
    }
}
