//! Contact message repository

use crate::models::{Contact, ContactInput, ListParams, ReadFilter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn create(&self, input: &ContactInput) -> Result<Contact>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Contact>>;

    /// Newest first
    async fn list(&self, filter: ReadFilter, params: &ListParams) -> Result<(Vec<Contact>, i64)>;

    async fn mark_read(&self, ids: &[i64], is_read: bool) -> Result<u64>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn bulk_delete(&self, ids: &[i64]) -> Result<u64>;

    async fn unread_count(&self) -> Result<i64>;
}

/// SQLx-based contact repository
pub struct SqlxContactRepository {
    pool: SqlitePool,
}

impl SqlxContactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn ContactRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ContactRepository for SqlxContactRepository {
    async fn create(&self, input: &ContactInput) -> Result<Contact> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO contacts (name, email, subject, message, is_read, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(input.name.trim())
        .bind(input.email.trim())
        .bind(input.subject.trim())
        .bind(input.message.trim())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to store contact message")?;

        Ok(Contact {
            id: result.last_insert_rowid(),
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            subject: input.subject.trim().to_string(),
            message: input.message.trim().to_string(),
            is_read: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT id, name, email, subject, message, is_read, created_at, updated_at FROM contacts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get contact message")?;
        Ok(row.as_ref().map(row_to_contact))
    }

    async fn list(&self, filter: ReadFilter, params: &ListParams) -> Result<(Vec<Contact>, i64)> {
        let is_read = filter.is_read();

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM contacts WHERE (? IS NULL OR is_read = ?)",
        )
        .bind(is_read)
        .bind(is_read)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count contact messages")?
        .get("count");

        let rows = sqlx::query(
            r#"
            SELECT id, name, email, subject, message, is_read, created_at, updated_at
            FROM contacts
            WHERE (? IS NULL OR is_read = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(is_read)
        .bind(is_read)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list contact messages")?;

        Ok((rows.iter().map(row_to_contact).collect(), total))
    }

    async fn mark_read(&self, ids: &[i64], is_read: bool) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE contacts SET is_read = ");
        qb.push_bind(is_read);
        qb.push(", updated_at = ").push_bind(Utc::now());
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
            .context("Failed to mark contact messages")?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete contact message")?;
        Ok(result.rows_affected() > 0)
    }

    async fn bulk_delete(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM contacts WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to bulk delete contact messages")?;
        Ok(result.rows_affected())
    }

    async fn unread_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM contacts WHERE is_read = 0")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count unread messages")?;
        Ok(row.get("count"))
    }
}

fn row_to_contact(row: &SqliteRow) -> Contact {
    Contact {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        subject: row.get("subject"),
        message: row.get("message"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
