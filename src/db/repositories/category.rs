//! Category repository
//!
//! Database operations for categories.

use crate::models::{Category, CategoryWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, name: &str, slug: &str, description: Option<&str>) -> Result<Category>;

    /// Returns `None` if the category does not exist
    async fn update(
        &self,
        id: i64,
        name: &str,
        slug: &str,
        description: Option<&str>,
    ) -> Result<Option<Category>>;

    /// Delete a category; post links go with it, posts stay
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Category>>;

    /// All categories ordered by name, with their published post counts
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>>;

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based category repository
pub struct SqlxCategoryRepository {
    pool: SqlitePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, name: &str, slug: &str, description: Option<&str>) -> Result<Category> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO categories (name, slug, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create category")?;

        Ok(Category {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(
        &self,
        id: i64,
        name: &str,
        slug: &str,
        description: Option<&str>,
    ) -> Result<Option<Category>> {
        let result = sqlx::query(
            "UPDATE categories SET name = ?, slug = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update category")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete category")?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let row = sqlx::query(
            "SELECT id, name, slug, description, created_at, updated_at FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get category by ID")?;
        Ok(row.as_ref().map(row_to_category))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query(
            "SELECT id, name, slug, description, created_at, updated_at FROM categories WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get category by slug")?;
        Ok(row.as_ref().map(row_to_category))
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Category>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, name, slug, description, created_at, updated_at FROM categories WHERE id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY name");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to get categories by IDs")?;
        Ok(rows.iter().map(row_to_category).collect())
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.slug, c.description, c.created_at, c.updated_at,
                (SELECT COUNT(*) FROM post_categories pc
                    JOIN posts p ON p.id = pc.post_id
                    WHERE pc.category_id = c.id AND p.status = 'PUBLISHED') AS post_count
            FROM categories c
            ORDER BY c.name COLLATE NOCASE
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list categories")?;

        Ok(rows
            .iter()
            .map(|row| CategoryWithCount {
                category: row_to_category(row),
                post_count: row.get("post_count"),
            })
            .collect())
    }

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM categories WHERE LOWER(name) = LOWER(?) AND (? IS NULL OR id != ?)",
        )
        .bind(name)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check category name")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM categories WHERE slug = ? AND (? IS NULL OR id != ?)",
        )
        .bind(slug)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check category slug")?;
        Ok(row.get::<i64, _>("count") > 0)
    }
}

fn row_to_category(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;

    async fn repo() -> SqlxCategoryRepository {
        SqlxCategoryRepository::new(migrated_test_pool().await)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = repo().await;
        let created = repo.create("Rust", "rust", Some("Systems")).await.unwrap();

        assert_eq!(repo.get_by_slug("rust").await.unwrap().unwrap().id, created.id);
        assert!(repo.name_exists("RUST", None).await.unwrap());
        assert!(!repo.name_exists("Rust", Some(created.id)).await.unwrap());
        assert!(repo.slug_exists("rust", None).await.unwrap());
        assert!(repo.create("Rust", "rust-2", None).await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = repo().await;
        let created = repo.create("Go", "go", None).await.unwrap();

        let updated = repo
            .update(created.id, "Golang", "golang", Some("Gophers"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.slug, "golang");
        assert!(repo.update(999, "x", "x", None).await.unwrap().is_none());

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_with_counts_and_ids() {
        let repo = repo().await;
        let b = repo.create("Beta", "beta", None).await.unwrap();
        let a = repo.create("alpha", "alpha", None).await.unwrap();

        let listed = repo.list_with_counts().await.unwrap();
        assert_eq!(listed[0].category.name, "alpha");
        assert_eq!(listed[1].post_count, 0);

        let found = repo.get_by_ids(&[a.id, b.id, 77]).await.unwrap();
        assert_eq!(found.len(), 2);
    }
}
