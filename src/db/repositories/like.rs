//! Like repository
//!
//! A like is a `(user_id, post_id)` row; the UNIQUE constraint keeps at most
//! one per pair.

use crate::models::LikeState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Like repository trait
#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// Add the like if absent, remove it if present
    async fn toggle(&self, user_id: i64, post_id: i64) -> Result<LikeState>;

    async fn exists(&self, user_id: i64, post_id: i64) -> Result<bool>;

    async fn count_for_post(&self, post_id: i64) -> Result<i64>;

    async fn count_all(&self) -> Result<i64>;
}

/// SQLx-based like repository
pub struct SqlxLikeRepository {
    pool: SqlitePool,
}

impl SqlxLikeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn LikeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LikeRepository for SqlxLikeRepository {
    async fn toggle(&self, user_id: i64, post_id: i64) -> Result<LikeState> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let removed = sqlx::query("DELETE FROM likes WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to remove like")?
            .rows_affected();

        let liked = if removed == 0 {
            sqlx::query("INSERT OR IGNORE INTO likes (user_id, post_id, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(post_id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .context("Failed to add like")?;
            true
        } else {
            false
        };

        let like_count = count_likes(&mut tx, post_id).await?;
        tx.commit().await.context("Failed to commit like")?;

        Ok(LikeState { liked, like_count })
    }

    async fn exists(&self, user_id: i64, post_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM likes WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check like")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn count_for_post(&self, post_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        count_likes(&mut conn, post_id).await
    }

    async fn count_all(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM likes")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count likes")?;
        Ok(row.get("count"))
    }
}

async fn count_likes(conn: &mut SqliteConnection, post_id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM likes WHERE post_id = ?")
        .bind(post_id)
        .fetch_one(conn)
        .await
        .context("Failed to count likes")?;
    Ok(row.get("count"))
}
