//! Comment repository
//!
//! Comments reference their parent through `parent_id`; deleting a comment
//! removes its replies through the foreign key cascade.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::models::{AdminComment, AuthorInfo, Comment, CommentWithAuthor, ListParams};

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a comment or reply
    async fn create(
        &self,
        author_id: i64,
        post_id: i64,
        parent_id: Option<i64>,
        content: &str,
    ) -> Result<CommentWithAuthor>;

    /// Get a comment by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Depth of a comment in its thread, 1 for a top-level comment
    async fn depth(&self, id: i64) -> Result<u32>;

    /// Every comment of a post, oldest first
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>>;

    /// Delete a comment and, by cascade, its replies
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Delete the listed comments in one statement.
    ///
    /// Returns the number of listed comments that existed and the slugs of
    /// the posts they belonged to.
    async fn bulk_delete(&self, ids: &[i64]) -> Result<(u64, Vec<String>)>;

    /// Newest comments across all posts for moderation
    async fn list_recent(
        &self,
        search: Option<&str>,
        params: &ListParams,
    ) -> Result<(Vec<AdminComment>, i64)>;

    async fn count_all(&self) -> Result<i64>;
}

/// SQLx-based comment repository
pub struct SqlxCommentRepository {
    pool: SqlitePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.content, c.author_id, c.post_id, c.parent_id, c.created_at, c.updated_at,
        u.name AS author_name, u.email AS author_email, u.image AS author_image
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(
        &self,
        author_id: i64,
        post_id: i64,
        parent_id: Option<i64>,
        content: &str,
    ) -> Result<CommentWithAuthor> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO comments (content, author_id, post_id, parent_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(content)
        .bind(author_id)
        .bind(post_id)
        .bind(parent_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create comment")?;

        let id = result.last_insert_rowid();
        let row = sqlx::query(&format!("{} WHERE c.id = ?", COMMENT_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to load created comment")?;
        Ok(row_to_comment_with_author(&row))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let row = sqlx::query(
            r#"
            SELECT id, content, author_id, post_id, parent_id, created_at, updated_at
            FROM comments WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get comment by ID")?;
        Ok(row.as_ref().map(row_to_comment))
    }

    async fn depth(&self, id: i64) -> Result<u32> {
        let row = sqlx::query(
            r#"
            WITH RECURSIVE chain(id, parent_id, depth) AS (
                SELECT id, parent_id, 1 FROM comments WHERE id = ?
                UNION ALL
                SELECT c.id, c.parent_id, chain.depth + 1
                FROM comments c JOIN chain ON c.id = chain.parent_id
            )
            SELECT COALESCE(MAX(depth), 0) AS depth FROM chain
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute comment depth")?;
        Ok(row.get::<i64, _>("depth").max(0) as u32)
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.post_id = ? ORDER BY c.created_at ASC, c.id ASC",
            COMMENT_SELECT
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list comments")?;
        Ok(rows.iter().map(row_to_comment_with_author).collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete comment")?;
        Ok(result.rows_affected() > 0)
    }

    async fn bulk_delete(&self, ids: &[i64]) -> Result<(u64, Vec<String>)> {
        if ids.is_empty() {
            return Ok((0, Vec::new()));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT COUNT(*) AS count FROM comments WHERE id IN (",
        );
        push_id_list(&mut qb, ids);
        let existing: i64 = qb
            .build()
            .fetch_one(&mut *tx)
            .await
            .context("Failed to count comments")?
            .get("count");

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT p.slug FROM comments c JOIN posts p ON p.id = c.post_id WHERE c.id IN (",
        );
        push_id_list(&mut qb, ids);
        let slugs: Vec<String> = qb
            .build()
            .fetch_all(&mut *tx)
            .await
            .context("Failed to resolve comment posts")?
            .iter()
            .map(|row| row.get("slug"))
            .collect();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM comments WHERE id IN (");
        push_id_list(&mut qb, ids);
        qb.build()
            .execute(&mut *tx)
            .await
            .context("Failed to bulk delete comments")?;

        tx.commit().await.context("Failed to commit comment deletion")?;
        Ok((existing as u64, slugs))
    }

    async fn list_recent(
        &self,
        search: Option<&str>,
        params: &ListParams,
    ) -> Result<(Vec<AdminComment>, i64)> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE (? IS NULL OR c.content LIKE ? OR u.email LIKE ? OR u.name LIKE ?)
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count comments")?
        .get("count");

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.content, c.author_id, c.post_id, c.parent_id, c.created_at, c.updated_at,
                u.name AS author_name, u.email AS author_email, u.image AS author_image,
                p.title AS post_title, p.slug AS post_slug,
                (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id) AS reply_count
            FROM comments c
            JOIN users u ON u.id = c.author_id
            JOIN posts p ON p.id = c.post_id
            WHERE (? IS NULL OR c.content LIKE ? OR u.email LIKE ? OR u.name LIKE ?)
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent comments")?;

        let comments = rows
            .iter()
            .map(|row| AdminComment {
                comment: row_to_comment_with_author(row),
                post_title: row.get("post_title"),
                post_slug: row.get("post_slug"),
                reply_count: row.get("reply_count"),
            })
            .collect();

        Ok((comments, total))
    }

    async fn count_all(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM comments")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count comments")?;
        Ok(row.get("count"))
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

fn row_to_comment(row: &SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        content: row.get("content"),
        author_id: row.get("author_id"),
        post_id: row.get("post_id"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_comment_with_author(row: &SqliteRow) -> CommentWithAuthor {
    let comment = row_to_comment(row);
    let email: String = row.get("author_email");
    let author = AuthorInfo::from_columns(
        comment.author_id,
        row.get("author_name"),
        &email,
        row.get("author_image"),
    );
    CommentWithAuthor { comment, author }
}
