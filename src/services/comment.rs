//! Comment service
//!
//! Threaded comments on published posts. Replies nest up to
//! [`MAX_COMMENT_DEPTH`] levels; deleting a comment removes its replies.

use crate::cache::MemoryCache;
use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{
    post_path, AdminComment, BulkDeleteResult, CommentInput, CommentNode, CommentThread,
    CommentWithAuthor, ListParams, PagedResult, PostStatus, User,
};
use crate::services::validation_message;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use validator::Validate;

/// Deepest nesting level; top-level comments are depth 1
pub const MAX_COMMENT_DEPTH: u32 = 3;

/// Error types for comment service operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The parent comment belongs to another post
    #[error("Parent comment does not belong to this post")]
    ParentMismatch,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    comment_repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
    cache: Arc<MemoryCache>,
}

impl CommentService {
    pub fn new(
        comment_repo: Arc<dyn CommentRepository>,
        post_repo: Arc<dyn PostRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            comment_repo,
            post_repo,
            cache,
        }
    }

    /// Add a comment or reply to a published post
    pub async fn create(
        &self,
        author: &User,
        input: CommentInput,
    ) -> Result<CommentWithAuthor, CommentServiceError> {
        input
            .validate()
            .map_err(|e| CommentServiceError::ValidationError(validation_message(&e)))?;
        let content = input.content.trim();
        if content.is_empty() {
            return Err(CommentServiceError::ValidationError(
                "Comment cannot be empty".to_string(),
            ));
        }

        let post = self
            .post_repo
            .get_by_id(input.post_id)
            .await?
            .filter(|p| p.status == PostStatus::Published)
            .ok_or_else(|| CommentServiceError::NotFound("Post".to_string()))?;

        if let Some(parent_id) = input.parent_id {
            let parent = self
                .comment_repo
                .get_by_id(parent_id)
                .await?
                .ok_or_else(|| CommentServiceError::NotFound("Parent comment".to_string()))?;
            if parent.post_id != post.id {
                return Err(CommentServiceError::ParentMismatch);
            }
            if self.comment_repo.depth(parent_id).await? >= MAX_COMMENT_DEPTH {
                return Err(CommentServiceError::ValidationError(format!(
                    "Replies can only be nested {} levels deep",
                    MAX_COMMENT_DEPTH
                )));
            }
        }

        let comment = self
            .comment_repo
            .create(author.id, post.id, input.parent_id, content)
            .await?;

        self.cache.revalidate_path(&post.path()).await;
        tracing::info!(
            comment_id = comment.comment.id,
            post_id = post.id,
            parent_id = ?input.parent_id,
            "Comment created"
        );
        Ok(comment)
    }

    /// Comment tree of a post.
    ///
    /// Top-level comments come newest first, replies oldest first. Nodes at
    /// the deepest level carry no children and report them as hidden.
    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentNode>, CommentServiceError> {
        let comments = self.comment_repo.list_for_post(post_id).await?;
        Ok(build_tree(comments))
    }

    /// Top-level comments with their direct replies only
    pub async fn list_top_level_with_replies(
        &self,
        post_id: i64,
    ) -> Result<Vec<CommentThread>, CommentServiceError> {
        let comments = self.comment_repo.list_for_post(post_id).await?;
        let mut children = group_by_parent(&comments);

        let threads = comments
            .iter()
            .rev()
            .filter(|c| c.comment.parent_id.is_none())
            .map(|c| {
                let replies = children.remove(&c.comment.id).unwrap_or_default();
                CommentThread {
                    comment: c.clone(),
                    reply_count: replies.len() as i64,
                    replies: replies.into_iter().cloned().collect(),
                }
            })
            .collect();
        Ok(threads)
    }

    /// Delete a comment and its replies; returns the affected post path
    pub async fn delete(&self, actor: &User, id: i64) -> Result<String, CommentServiceError> {
        let comment = self
            .comment_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CommentServiceError::NotFound("Comment".to_string()))?;

        if !actor.can_edit(comment.author_id) {
            return Err(CommentServiceError::Forbidden(
                "You can only delete your own comments".to_string(),
            ));
        }

        let post = self.post_repo.get_by_id(comment.post_id).await?;
        self.comment_repo.delete(id).await?;

        let path = post.map(|p| p.path()).unwrap_or_default();
        if !path.is_empty() {
            self.cache.revalidate_path(&path).await;
        }
        tracing::info!(comment_id = id, actor_id = actor.id, "Comment deleted");
        Ok(path)
    }

    /// Delete the listed comments in one statement.
    ///
    /// `deleted` counts the listed comments that existed; replies removed by
    /// cascade are not counted.
    pub async fn bulk_delete(&self, ids: &[i64]) -> Result<BulkDeleteResult, CommentServiceError> {
        let ids: Vec<i64> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if ids.is_empty() {
            return Ok(BulkDeleteResult::default());
        }

        let (deleted, slugs) = self.comment_repo.bulk_delete(&ids).await?;
        let revalidated_paths: Vec<String> = slugs.iter().map(|s| post_path(s)).collect();
        for path in &revalidated_paths {
            self.cache.revalidate_path(path).await;
        }

        tracing::info!(deleted, posts = revalidated_paths.len(), "Comments bulk deleted");
        Ok(BulkDeleteResult {
            deleted,
            revalidated_paths,
        })
    }

    pub async fn list_recent(
        &self,
        search: Option<&str>,
        params: &ListParams,
    ) -> Result<PagedResult<AdminComment>, CommentServiceError> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let (items, total) = self.comment_repo.list_recent(search, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn count_all(&self) -> Result<i64, CommentServiceError> {
        Ok(self.comment_repo.count_all().await?)
    }
}

fn group_by_parent(comments: &[CommentWithAuthor]) -> HashMap<i64, Vec<&CommentWithAuthor>> {
    let mut children: HashMap<i64, Vec<&CommentWithAuthor>> = HashMap::new();
    for c in comments {
        if let Some(parent_id) = c.comment.parent_id {
            children.entry(parent_id).or_default().push(c);
        }
    }
    children
}

/// Build the display tree from comments ordered oldest first
fn build_tree(comments: Vec<CommentWithAuthor>) -> Vec<CommentNode> {
    let children = group_by_parent(&comments);
    comments
        .iter()
        .rev()
        .filter(|c| c.comment.parent_id.is_none())
        .map(|c| build_node(c, 1, &children))
        .collect()
}

fn build_node(
    comment: &CommentWithAuthor,
    depth: u32,
    children: &HashMap<i64, Vec<&CommentWithAuthor>>,
) -> CommentNode {
    let direct = children.get(&comment.comment.id).map(Vec::as_slice).unwrap_or_default();

    let (replies, hidden_replies) = if depth >= MAX_COMMENT_DEPTH {
        (Vec::new(), count_descendants(comment.comment.id, children))
    } else {
        let replies = direct.iter().map(|c| build_node(c, depth + 1, children)).collect();
        (replies, 0)
    };

    CommentNode {
        comment: comment.clone(),
        depth,
        reply_count: direct.len() as i64,
        hidden_replies,
        replies,
    }
}

fn count_descendants(id: i64, children: &HashMap<i64, Vec<&CommentWithAuthor>>) -> i64 {
    children
        .get(&id)
        .map(|direct| {
            direct
                .iter()
                .map(|c| 1 + count_descendants(c.comment.id, children))
                .sum()
        })
        .unwrap_or(0)
}
