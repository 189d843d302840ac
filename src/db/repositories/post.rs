//! Post repository
//!
//! Database operations for posts and their category/tag links.
//!
//! This module provides:
//! - `PostRepository` trait defining the interface for post data access
//! - `SqlxPostRepository` implementing the trait for SQLite
//!
//! Creating or updating a post writes the post row and its associations in a
//! single transaction. Listing and search share one dynamic query so that the
//! total count and the page always agree.

use crate::models::{
    AuthorInfo, ListParams, Post, PostDetail, PostFilter, PostRecord, PostSort, PostStatus,
    PostSummary, TagRef, TermRef,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Post totals by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostCounts {
    pub total: i64,
    pub published: i64,
    pub drafts: i64,
    pub scheduled: i64,
    pub featured: i64,
}

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post with its category and tag links in one transaction
    async fn create(&self, record: &PostRecord, category_ids: &[i64], tags: &[TagRef])
        -> Result<Post>;

    /// Update a post and replace its links in one transaction
    async fn update(
        &self,
        id: i64,
        record: &PostRecord,
        category_ids: &[i64],
        tags: &[TagRef],
    ) -> Result<Post>;

    /// Overwrite the editable text of a draft, returning the save time
    async fn update_draft(
        &self,
        id: i64,
        title: &str,
        content: &str,
        excerpt: Option<&str>,
    ) -> Result<DateTime<Utc>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Post with author, terms and counters, regardless of status
    async fn get_detail_by_slug(&self, slug: &str) -> Result<Option<PostDetail>>;

    async fn get_summaries_by_ids(&self, ids: &[i64]) -> Result<Vec<PostSummary>>;

    /// Filtered, sorted page of summaries plus the total match count
    async fn search(&self, filter: &PostFilter, params: &ListParams)
        -> Result<(Vec<PostSummary>, i64)>;

    /// Whether `author_id` already has a post titled `title` (case-insensitive)
    async fn exists_title_for_author(
        &self,
        author_id: i64,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool>;

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Delete the listed posts in one statement
    async fn bulk_delete(&self, ids: &[i64]) -> Result<u64>;

    /// Set the status of the listed posts; publishing stamps `published_at` if unset
    async fn set_status(&self, ids: &[i64], status: PostStatus) -> Result<u64>;

    async fn set_featured(&self, id: i64, featured: bool) -> Result<bool>;

    /// Promote scheduled posts that are due, returning their slugs
    async fn publish_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    async fn counts(&self) -> Result<PostCounts>;
}

/// SQLx-based post repository
pub struct SqlxPostRepository {
    pool: SqlitePool,
}

impl SqlxPostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const POST_COLUMNS: &str = "id, title, slug, content, excerpt, cover_image, status, featured, \
     published_at, author_id, created_at, updated_at";

const SUMMARY_SELECT: &str = r#"
    SELECT p.id, p.title, p.slug, p.excerpt, p.cover_image, p.status, p.featured,
        p.published_at, p.created_at, p.updated_at,
        u.id AS author_id, u.name AS author_name, u.email AS author_email, u.image AS author_image,
        (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
        (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(
        &self,
        record: &PostRecord,
        category_ids: &[i64],
        tags: &[TagRef],
    ) -> Result<Post> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            INSERT INTO posts (title, slug, content, excerpt, cover_image, status, featured,
                published_at, author_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.title)
        .bind(&record.slug)
        .bind(&record.content)
        .bind(&record.excerpt)
        .bind(&record.cover_image)
        .bind(record.status.as_str())
        .bind(record.featured)
        .bind(record.published_at)
        .bind(record.author_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create post")?;

        let post_id = result.last_insert_rowid();
        link_terms(&mut tx, post_id, category_ids, tags, now).await?;
        tx.commit().await.context("Failed to commit post")?;

        self.get_by_id(post_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post {} vanished after insert", post_id))
    }

    async fn update(
        &self,
        id: i64,
        record: &PostRecord,
        category_ids: &[i64],
        tags: &[TagRef],
    ) -> Result<Post> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, slug = ?, content = ?, excerpt = ?, cover_image = ?, status = ?,
                featured = ?, published_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.title)
        .bind(&record.slug)
        .bind(&record.content)
        .bind(&record.excerpt)
        .bind(&record.cover_image)
        .bind(record.status.as_str())
        .bind(record.featured)
        .bind(record.published_at)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update post")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Post {} not found", id);
        }

        sqlx::query("DELETE FROM post_categories WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear post categories")?;
        sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear post tags")?;

        link_terms(&mut tx, id, category_ids, tags, now).await?;
        tx.commit().await.context("Failed to commit post")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post {} vanished after update", id))
    }

    async fn update_draft(
        &self,
        id: i64,
        title: &str,
        content: &str,
        excerpt: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE posts SET title = ?, content = ?, excerpt = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(content)
        .bind(excerpt)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to save draft")?;
        Ok(now)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post by ID")?;
        row.as_ref().map(row_to_post).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post by slug")?;
        row.as_ref().map(row_to_post).transpose()
    }

    async fn get_detail_by_slug(&self, slug: &str) -> Result<Option<PostDetail>> {
        let row = sqlx::query(&format!("{} WHERE p.slug = ?", SUMMARY_SELECT))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post detail")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut summaries = vec![row_to_summary(&row)?];
        attach_terms(&self.pool, &mut summaries).await?;
        let content: String = sqlx::query("SELECT content FROM posts WHERE id = ?")
            .bind(summaries[0].id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to load post content")?
            .get("content");

        Ok(summaries.pop().map(|summary| PostDetail {
            summary,
            content,
            liked_by_viewer: false,
        }))
    }

    async fn get_summaries_by_ids(&self, ids: &[i64]) -> Result<Vec<PostSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SUMMARY_SELECT);
        qb.push(" WHERE p.id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to get posts by IDs")?;

        let mut summaries = rows.iter().map(row_to_summary).collect::<Result<Vec<_>>>()?;
        attach_terms(&self.pool, &mut summaries).await?;
        Ok(summaries)
    }

    async fn search(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<(Vec<PostSummary>, i64)> {
        let mut count_qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS count FROM posts p");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count posts")?
            .get("count");

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SUMMARY_SELECT);
        push_filters(&mut qb, filter);
        qb.push(match filter.sort {
            PostSort::Latest => " ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC",
            PostSort::Oldest => " ORDER BY COALESCE(p.published_at, p.created_at) ASC, p.id ASC",
            PostSort::Title => " ORDER BY p.title COLLATE NOCASE ASC, p.id ASC",
        });
        qb.push(" LIMIT ").push_bind(params.limit());
        qb.push(" OFFSET ").push_bind(params.offset());

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to search posts")?;

        let mut summaries = rows.iter().map(row_to_summary).collect::<Result<Vec<_>>>()?;
        attach_terms(&self.pool, &mut summaries).await?;
        Ok((summaries, total))
    }

    async fn exists_title_for_author(
        &self,
        author_id: i64,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM posts
            WHERE author_id = ? AND LOWER(title) = LOWER(?) AND (? IS NULL OR id != ?)
            "#,
        )
        .bind(author_id)
        .bind(title.trim())
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check post title")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM posts WHERE slug = ? AND (? IS NULL OR id != ?)",
        )
        .bind(slug)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check post slug")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete post")?;
        Ok(result.rows_affected() > 0)
    }

    async fn bulk_delete(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM posts WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to bulk delete posts")?;
        Ok(result.rows_affected())
    }

    async fn set_status(&self, ids: &[i64], status: PostStatus) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE posts SET status = ");
        qb.push_bind(status.as_str());
        if status == PostStatus::Published {
            qb.push(", published_at = COALESCE(published_at, ")
                .push_bind(now)
                .push(")");
        }
        qb.push(", updated_at = ").push_bind(now);
        qb.push(" WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to update post status")?;
        Ok(result.rows_affected())
    }

    async fn set_featured(&self, id: i64, featured: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE posts SET featured = ?, updated_at = ? WHERE id = ?")
            .bind(featured)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update featured flag")?;
        Ok(result.rows_affected() > 0)
    }

    async fn publish_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            UPDATE posts SET status = 'PUBLISHED', updated_at = ?
            WHERE status = 'SCHEDULED' AND published_at IS NOT NULL AND published_at <= ?
            RETURNING slug
            "#,
        )
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .context("Failed to publish scheduled posts")?;
        Ok(rows.iter().map(|row| row.get("slug")).collect())
    }

    async fn counts(&self) -> Result<PostCounts> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'PUBLISHED' THEN 1 ELSE 0 END), 0) AS published,
                COALESCE(SUM(CASE WHEN status = 'DRAFT' THEN 1 ELSE 0 END), 0) AS drafts,
                COALESCE(SUM(CASE WHEN status = 'SCHEDULED' THEN 1 ELSE 0 END), 0) AS scheduled,
                COALESCE(SUM(CASE WHEN featured THEN 1 ELSE 0 END), 0) AS featured
            FROM posts
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count posts")?;

        Ok(PostCounts {
            total: row.get("total"),
            published: row.get("published"),
            drafts: row.get("drafts"),
            scheduled: row.get("scheduled"),
            featured: row.get("featured"),
        })
    }
}

/// Append the WHERE clause for `filter`. Used by both the count and page queries.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(status) = filter.status {
        qb.push(" AND p.status = ").push_bind(status.as_str());
    }

    if let Some(keyword) = filter.keyword() {
        let pattern = format!("%{}%", keyword);
        qb.push(" AND (p.title LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.excerpt LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.content LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if !filter.categories.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM post_categories pc \
             JOIN categories c ON c.id = pc.category_id \
             WHERE pc.post_id = p.id AND c.slug IN (",
        );
        let mut separated = qb.separated(", ");
        for slug in &filter.categories {
            separated.push_bind(slug.clone());
        }
        separated.push_unseparated("))");
    }

    if !filter.tags.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM post_tags pt \
             JOIN tags t ON t.id = pt.tag_id \
             WHERE pt.post_id = p.id AND t.slug IN (",
        );
        let mut separated = qb.separated(", ");
        for slug in &filter.tags {
            separated.push_bind(slug.clone());
        }
        separated.push_unseparated("))");
    }

    if let Some(author_id) = filter.author_id {
        qb.push(" AND p.author_id = ").push_bind(author_id);
    }

    if let Some(featured) = filter.featured {
        qb.push(" AND p.featured = ").push_bind(featured);
    }

    let (start, end) = filter.published_bounds();
    if let Some(start) = start {
        qb.push(" AND p.published_at >= ").push_bind(start);
    }
    if let Some(end) = end {
        qb.push(" AND p.published_at < ").push_bind(end);
    }
}

/// Insert category links and find-or-create tags, then link them
async fn link_terms(
    conn: &mut SqliteConnection,
    post_id: i64,
    category_ids: &[i64],
    tags: &[TagRef],
    now: DateTime<Utc>,
) -> Result<()> {
    for category_id in category_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO post_categories (post_id, category_id, assigned_at) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(category_id)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to link category")?;
    }

    for tag in tags {
        sqlx::query(
            "INSERT OR IGNORE INTO tags (name, slug, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&tag.name)
        .bind(&tag.slug)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to create tag")?;

        let tag_id: i64 = sqlx::query("SELECT id FROM tags WHERE slug = ? OR name = ? LIMIT 1")
            .bind(&tag.slug)
            .bind(&tag.name)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to resolve tag")?
            .get("id");

        sqlx::query(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_id, assigned_at) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(tag_id)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to link tag")?;
    }

    Ok(())
}

/// Fill `categories` and `tags` of each summary with two batched queries
async fn attach_terms(pool: &SqlitePool, summaries: &mut [PostSummary]) -> Result<()> {
    if summaries.is_empty() {
        return Ok(());
    }
    let ids: Vec<i64> = summaries.iter().map(|s| s.id).collect();

    let mut categories = load_terms(
        pool,
        "SELECT pc.post_id, c.id, c.name, c.slug FROM post_categories pc \
         JOIN categories c ON c.id = pc.category_id WHERE pc.post_id IN (",
        &ids,
    )
    .await
    .context("Failed to load post categories")?;

    let mut tags = load_terms(
        pool,
        "SELECT pt.post_id, t.id, t.name, t.slug FROM post_tags pt \
         JOIN tags t ON t.id = pt.tag_id WHERE pt.post_id IN (",
        &ids,
    )
    .await
    .context("Failed to load post tags")?;

    for summary in summaries.iter_mut() {
        summary.categories = categories.remove(&summary.id).unwrap_or_default();
        summary.tags = tags.remove(&summary.id).unwrap_or_default();
    }
    Ok(())
}

async fn load_terms(
    pool: &SqlitePool,
    prefix: &str,
    ids: &[i64],
) -> Result<HashMap<i64, Vec<TermRef>>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(prefix);
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY 3");

    let rows = qb.build().fetch_all(pool).await?;
    let mut terms: HashMap<i64, Vec<TermRef>> = HashMap::new();
    for row in rows {
        terms.entry(row.get("post_id")).or_default().push(TermRef {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
        });
    }
    Ok(terms)
}

fn parse_status(row: &SqliteRow) -> Result<PostStatus> {
    let status: String = row.get("status");
    PostStatus::from_str(&status).map_err(|e| anyhow::anyhow!(e))
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        content: row.get("content"),
        excerpt: row.get("excerpt"),
        cover_image: row.get("cover_image"),
        status: parse_status(row)?,
        featured: row.get("featured"),
        published_at: row.get("published_at"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_summary(row: &SqliteRow) -> Result<PostSummary> {
    let email: String = row.get("author_email");
    Ok(PostSummary {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        excerpt: row.get("excerpt"),
        cover_image: row.get("cover_image"),
        status: parse_status(row)?,
        featured: row.get("featured"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        author: AuthorInfo::from_columns(
            row.get("author_id"),
            row.get("author_name"),
            &email,
            row.get("author_image"),
        ),
        categories: Vec::new(),
        tags: Vec::new(),
        like_count: row.get("like_count"),
        comment_count: row.get("comment_count"),
    })
}
