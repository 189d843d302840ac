//! Tag repository
//!
//! Database operations for tags.

use crate::models::{Tag, TagRef, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, name: &str, slug: &str) -> Result<Tag>;

    /// Returns `None` if the tag does not exist
    async fn update(&self, id: i64, name: &str, slug: &str) -> Result<Option<Tag>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// All tags ordered by name, with their published post counts
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    /// Return the tags for `refs`, creating the missing ones
    async fn find_or_create_many(&self, refs: &[TagRef]) -> Result<Vec<Tag>>;

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based tag repository
pub struct SqlxTagRepository {
    pool: SqlitePool,
}

impl SqlxTagRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, name: &str, slug: &str) -> Result<Tag> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO tags (name, slug, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(slug)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create tag")?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, id: i64, name: &str, slug: &str) -> Result<Option<Tag>> {
        let result = sqlx::query("UPDATE tags SET name = ?, slug = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(slug)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update tag")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete tag")?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, slug, created_at, updated_at FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tag by ID")?;
        Ok(row.as_ref().map(row_to_tag))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let row =
            sqlx::query("SELECT id, name, slug, created_at, updated_at FROM tags WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to get tag by slug")?;
        Ok(row.as_ref().map(row_to_tag))
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.slug, t.created_at, t.updated_at,
                (SELECT COUNT(*) FROM post_tags pt
                    JOIN posts p ON p.id = pt.post_id
                    WHERE pt.tag_id = t.id AND p.status = 'PUBLISHED') AS post_count
            FROM tags t
            ORDER BY t.name COLLATE NOCASE
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tags")?;

        Ok(rows
            .iter()
            .map(|row| TagWithCount {
                tag: row_to_tag(row),
                post_count: row.get("post_count"),
            })
            .collect())
    }

    async fn find_or_create_many(&self, refs: &[TagRef]) -> Result<Vec<Tag>> {
        let mut tags = Vec::with_capacity(refs.len());
        for tag_ref in refs {
            let now = Utc::now();
            sqlx::query(
                "INSERT OR IGNORE INTO tags (name, slug, created_at, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&tag_ref.name)
            .bind(&tag_ref.slug)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to create tag")?;

            let row = sqlx::query(
                "SELECT id, name, slug, created_at, updated_at FROM tags WHERE slug = ? OR name = ? LIMIT 1",
            )
            .bind(&tag_ref.slug)
            .bind(&tag_ref.name)
            .fetch_one(&self.pool)
            .await
            .context("Failed to resolve tag")?;

            let tag = row_to_tag(&row);
            if !tags.iter().any(|t: &Tag| t.id == tag.id) {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM tags WHERE LOWER(name) = LOWER(?) AND (? IS NULL OR id != ?)",
        )
        .bind(name)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check tag name")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM tags WHERE slug = ? AND (? IS NULL OR id != ?)",
        )
        .bind(slug)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check tag slug")?;
        Ok(row.get::<i64, _>("count") > 0)
    }
}

fn row_to_tag(row: &SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;

    async fn repo() -> SqlxTagRepository {
        SqlxTagRepository::new(migrated_test_pool().await)
    }

    fn tag_ref(name: &str) -> TagRef {
        TagRef {
            name: name.to_string(),
            slug: name.to_lowercase(),
        }
    }

    #[tokio::test]
    async fn test_find_or_create_many_reuses_existing() {
        let repo = repo().await;
        let existing = repo.create("Rust", "rust").await.unwrap();

        let tags = repo
            .find_or_create_many(&[tag_ref("Rust"), tag_ref("Axum"), tag_ref("Axum")])
            .await
            .unwrap();

        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].id, existing.id);
        assert_eq!(tags[1].slug, "axum");
        assert_eq!(repo.list_with_counts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_delete_and_uniqueness() {
        let repo = repo().await;
        let tag = repo.create("web", "web").await.unwrap();
        assert!(repo.create("web", "web-2").await.is_err());
        assert!(repo.name_exists("WEB", None).await.unwrap());
        assert!(!repo.slug_exists("web", Some(tag.id)).await.unwrap());

        let updated = repo.update(tag.id, "Web", "web-dev").await.unwrap().unwrap();
        assert_eq!(updated.slug, "web-dev");
        assert!(repo.get_by_slug("web-dev").await.unwrap().is_some());

        assert!(repo.delete(tag.id).await.unwrap());
        assert!(repo.get_by_id(tag.id).await.unwrap().is_none());
    }
}
