//! User repository
//!
//! Database operations for users and their linked OAuth accounts.

use crate::models::{Account, ListParams, User, UserRole, UserWithStats};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user, returning the stored row
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Lookup is case-insensitive
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn count(&self) -> Result<i64>;

    async fn count_admins(&self) -> Result<i64>;

    /// Page through users, optionally matching name or email
    async fn list(
        &self,
        search: Option<&str>,
        params: &ListParams,
    ) -> Result<(Vec<UserWithStats>, i64)>;

    async fn update_role(&self, id: i64, role: UserRole) -> Result<bool>;

    async fn update_profile(&self, id: i64, name: Option<&str>, image: Option<&str>) -> Result<()>;

    /// Delete a user; posts, comments, likes and sessions go with it
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn find_by_account(&self, provider: &str, provider_account_id: &str) -> Result<Option<User>>;

    async fn link_account(
        &self,
        user_id: i64,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Account>;
}

/// SQLx-based user repository
pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str =
    "u.id, u.email, u.name, u.image, u.role, u.password_hash, u.created_at, u.updated_at";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, name, image, role, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.email.trim().to_lowercase())
        .bind(&user.name)
        .bind(&user.image)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create user")?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users u WHERE u.id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by ID")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users u WHERE u.email = ?",
            USER_COLUMNS
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user by email")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        Ok(row.get("count"))
    }

    async fn count_admins(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users WHERE role = 'ADMIN'")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count admins")?;
        Ok(row.get("count"))
    }

    async fn list(
        &self,
        search: Option<&str>,
        params: &ListParams,
    ) -> Result<(Vec<UserWithStats>, i64)> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM users u WHERE (? IS NULL OR u.email LIKE ? OR u.name LIKE ?)",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count users")?
        .get("count");

        let rows = sqlx::query(&format!(
            r#"
            SELECT {},
                (SELECT COUNT(*) FROM posts p WHERE p.author_id = u.id) AS post_count,
                (SELECT COUNT(*) FROM comments c WHERE c.author_id = u.id) AS comment_count
            FROM users u
            WHERE (? IS NULL OR u.email LIKE ? OR u.name LIKE ?)
            ORDER BY u.created_at DESC, u.id DESC
            LIMIT ? OFFSET ?
            "#,
            USER_COLUMNS
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        let users = rows
            .iter()
            .map(|row| {
                Ok(UserWithStats {
                    user: row_to_user(row)?,
                    post_count: row.get("post_count"),
                    comment_count: row.get("comment_count"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((users, total))
    }

    async fn update_role(&self, id: i64, role: UserRole) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update user role")?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_profile(&self, id: i64, name: Option<&str>, image: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE(?, name), image = COALESCE(?, image), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(image)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update user profile")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_account(&self, provider: &str, provider_account_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM users u
            JOIN accounts a ON a.user_id = u.id
            WHERE a.provider = ? AND a.provider_account_id = ?
            "#,
            USER_COLUMNS
        ))
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find user by account")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn link_account(
        &self,
        user_id: i64,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Account> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (user_id, provider, provider_account_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_account_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to link account")?;

        Ok(Account {
            id: result.last_insert_rowid(),
            user_id,
            provider: provider.to_string(),
            provider_account_id: provider_account_id.to_string(),
            created_at: now,
        })
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        image: row.get("image"),
        role: UserRole::from_str(&role)?,
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;

    async fn repo() -> SqlxUserRepository {
        SqlxUserRepository::new(migrated_test_pool().await)
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = repo().await;
        let user = User::new("Ada@Example.com".into(), Some("Ada".into()), UserRole::Admin);
        let created = repo.create(&user).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.email, "ada@example.com");
        assert_eq!(created.role, UserRole::Admin);

        let by_email = repo.get_by_email("ADA@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.count_admins().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = repo().await;
        let user = User::new("a@example.com".into(), None, UserRole::User);
        repo.create(&user).await.unwrap();
        assert!(repo.create(&user).await.is_err());
    }

    #[tokio::test]
    async fn test_list_with_search() {
        let repo = repo().await;
        for (email, name) in [("ada@example.com", "Ada"), ("bob@example.com", "Bob")] {
            repo.create(&User::new(email.into(), Some(name.into()), UserRole::User))
                .await
                .unwrap();
        }

        let (all, total) = repo.list(None, &ListParams::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);

        let (found, total) = repo.list(Some("bob"), &ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].user.email, "bob@example.com");
        assert_eq!(found[0].post_count, 0);
    }

    #[tokio::test]
    async fn test_account_linking() {
        let repo = repo().await;
        let user = repo
            .create(&User::new("gh@example.com".into(), None, UserRole::User))
            .await
            .unwrap();

        assert!(repo.find_by_account("github", "42").await.unwrap().is_none());
        repo.link_account(user.id, "github", "42").await.unwrap();
        let found = repo.find_by_account("github", "42").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        assert!(repo.link_account(user.id, "github", "42").await.is_err());
    }

    #[tokio::test]
    async fn test_update_role_and_delete() {
        let repo = repo().await;
        let user = repo
            .create(&User::new("u@example.com".into(), None, UserRole::User))
            .await
            .unwrap();

        assert!(repo.update_role(user.id, UserRole::Admin).await.unwrap());
        assert!(repo.get_by_id(user.id).await.unwrap().unwrap().is_admin());

        assert!(repo.delete(user.id).await.unwrap());
        assert!(!repo.delete(user.id).await.unwrap());
    }
}
