//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings. Each one runs inside a
//! transaction and is recorded in the `_migrations` table, so running the list
//! again only applies what is missing.
//!
//! ```ignore
//! let pool = quillpress::db::create_pool(&config.database).await?;
//! quillpress::db::migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// A schema migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number (unique, applied in ascending order)
    pub version: i32,
    /// Human-readable name
    pub name: &'static str,
    /// SQL statements separated by `;`
    pub sql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(100),
                image TEXT,
                role VARCHAR(10) NOT NULL DEFAULT 'USER' CHECK (role IN ('USER', 'ADMIN')),
                password_hash VARCHAR(255),
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        "#,
    },
    Migration {
        version: 2,
        name: "create_accounts_and_sessions",
        sql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                provider VARCHAR(30) NOT NULL,
                provider_account_id VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (provider, provider_account_id)
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_taxonomy",
        sql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(60) NOT NULL UNIQUE,
                slug VARCHAR(80) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(60) NOT NULL UNIQUE,
                slug VARCHAR(80) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_posts",
        sql: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(255) NOT NULL UNIQUE,
                content TEXT NOT NULL,
                excerpt TEXT,
                cover_image TEXT,
                status VARCHAR(10) NOT NULL DEFAULT 'DRAFT'
                    CHECK (status IN ('DRAFT', 'PUBLISHED', 'SCHEDULED')),
                featured INTEGER NOT NULL DEFAULT 0,
                published_at TIMESTAMP,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_posts_status_published ON posts(status, published_at);
            CREATE INDEX IF NOT EXISTS idx_posts_author_title ON posts(author_id, title);
            CREATE TABLE IF NOT EXISTS post_categories (
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                assigned_at TIMESTAMP NOT NULL,
                PRIMARY KEY (post_id, category_id)
            );
            CREATE INDEX IF NOT EXISTS idx_post_categories_category ON post_categories(category_id);
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                assigned_at TIMESTAMP NOT NULL,
                PRIMARY KEY (post_id, tag_id)
            );
            CREATE INDEX IF NOT EXISTS idx_post_tags_tag ON post_tags(tag_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_comments_and_likes",
        sql: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                parent_id INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, parent_id);
            CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
            CREATE TABLE IF NOT EXISTS likes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (user_id, post_id)
            );
            CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_contacts",
        sql: r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL,
                subject VARCHAR(200) NOT NULL,
                message TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contacts_read ON contacts(is_read, created_at);
        "#,
    },
];

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(pool: &SqlitePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied_versions.contains(&(migration.version as i64)) {
            continue;
        }
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create migrations table")?;
    Ok(())
}

async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.sql) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if every migration has been applied
pub async fn is_up_to_date(pool: &SqlitePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &SqlitePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        let row = sqlx::query("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap();
        row.get::<i64, _>(0) == 1
    }

    async fn seed_user_and_post(pool: &SqlitePool) -> (i64, i64) {
        let now = Utc::now();
        let user_id = sqlx::query(
            "INSERT INTO users (email, name, role, created_at, updated_at) VALUES ('a@b.c', 'A', 'USER', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();
        let post_id = sqlx::query(
            "INSERT INTO posts (title, slug, content, author_id, created_at, updated_at) VALUES ('T', 't', '<p>x</p>', ?, ?, ?)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();
        (user_id, post_id)
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pending_count(&pool).await.unwrap(), total_migrations());

        let applied = run_migrations(&pool).await.unwrap();
        assert_eq!(applied, total_migrations());
        assert!(is_up_to_date(&pool).await.unwrap());

        let applied_again = run_migrations(&pool).await.unwrap();
        assert_eq!(applied_again, 0);
    }

    #[tokio::test]
    async fn test_all_tables_created() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        for table in [
            "users",
            "accounts",
            "sessions",
            "categories",
            "tags",
            "posts",
            "post_categories",
            "post_tags",
            "comments",
            "likes",
            "contacts",
        ] {
            assert!(table_exists(&pool, table).await, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_comment_replies_cascade() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let (user_id, post_id) = seed_user_and_post(&pool).await;
        let now = Utc::now();

        let parent = sqlx::query(
            "INSERT INTO comments (content, author_id, post_id, created_at, updated_at) VALUES ('p', ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(post_id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query(
            "INSERT INTO comments (content, author_id, post_id, parent_id, created_at, updated_at) VALUES ('r', ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(post_id)
        .bind(parent)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(parent)
            .execute(&pool)
            .await
            .unwrap();

        let remaining: i64 = sqlx::query("SELECT COUNT(*) FROM comments")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_like_unique_per_user_and_post() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let (user_id, post_id) = seed_user_and_post(&pool).await;

        let insert = || {
            sqlx::query("INSERT INTO likes (user_id, post_id, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(post_id)
                .bind(Utc::now())
                .execute(&pool)
        };
        assert!(insert().await.is_ok());
        assert!(insert().await.is_err());
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_to_posts_and_comments() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let (user_id, post_id) = seed_user_and_post(&pool).await;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO comments (content, author_id, post_id, created_at, updated_at) VALUES ('c', ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(post_id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();

        let comments: i64 = sqlx::query("SELECT COUNT(*) FROM comments")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
        let posts: i64 = sqlx::query("SELECT COUNT(*) FROM posts")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
        assert_eq!(comments, 0);
        assert_eq!(posts, 0);
    }

    #[tokio::test]
    async fn test_post_status_check_constraint() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let (user_id, _) = seed_user_and_post(&pool).await;
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO posts (title, slug, content, status, author_id, created_at, updated_at) VALUES ('x', 'x', '', 'ARCHIVED', ?, ?, ?)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_get_migration() {
        assert_eq!(get_migration(1).map(|m| m.name), Some("create_users"));
        assert!(get_migration(999).is_none());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- comment only;\nCREATE INDEX i ON a(id);\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE"));
        assert!(statements[1].starts_with("CREATE INDEX"));
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- a\n  -- b"));
        assert!(!is_comment_only("-- a\nSELECT 1"));
    }

    #[test]
    fn test_versions_are_ascending() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }
}
