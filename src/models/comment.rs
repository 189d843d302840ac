//! Comment model
//!
//! Comments form a tree per post through the nullable `parent_id`. A parent
//! always belongs to the same post as its replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::AuthorInfo;

/// Comment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub author_id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comment joined with its author
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: AuthorInfo,
}

/// A comment and its rendered replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: CommentWithAuthor,
    /// 1 for top-level comments
    pub depth: u32,
    /// Number of direct replies, rendered or not
    pub reply_count: i64,
    /// Direct replies that are not rendered because the depth limit was reached
    pub hidden_replies: i64,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn id(&self) -> i64 {
        self.comment.comment.id
    }

    /// Total number of nodes in this subtree, including itself
    pub fn subtree_len(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::subtree_len).sum::<usize>()
    }
}

/// Top-level comment with its direct replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: CommentWithAuthor,
    pub reply_count: i64,
    pub replies: Vec<CommentWithAuthor>,
}

/// Comment row for the moderation table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminComment {
    #[serde(flatten)]
    pub comment: CommentWithAuthor,
    pub post_title: String,
    pub post_slug: String,
    pub reply_count: i64,
}

/// Reply or top-level comment submitted by a reader
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CommentInput {
    pub post_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[validate(length(min = 1, max = 2000, message = "Comment must be between 1 and 2000 characters"))]
    pub content: String,
}

/// Outcome of a bulk deletion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteResult {
    /// Rows removed by the statement itself (cascaded rows are not counted)
    pub deleted: u64,
    /// Cached paths invalidated as a consequence
    pub revalidated_paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, replies: Vec<CommentNode>) -> CommentNode {
        let now = Utc::now();
        CommentNode {
            comment: CommentWithAuthor {
                comment: Comment {
                    id,
                    content: "hi".into(),
                    author_id: 1,
                    post_id: 1,
                    parent_id: None,
                    created_at: now,
                    updated_at: now,
                },
                author: AuthorInfo {
                    id: 1,
                    name: "a".into(),
                    avatar_url: String::new(),
                },
            },
            depth: 1,
            reply_count: replies.len() as i64,
            hidden_replies: 0,
            replies,
        }
    }

    #[test]
    fn test_subtree_len() {
        let tree = node(1, vec![node(2, vec![node(3, vec![])]), node(4, vec![])]);
        assert_eq!(tree.subtree_len(), 4);
        assert_eq!(tree.id(), 1);
    }

    #[test]
    fn test_comment_input_rejects_empty() {
        let input = CommentInput {
            post_id: 1,
            parent_id: None,
            content: String::new(),
        };
        assert!(input.validate().is_err());
    }
}
