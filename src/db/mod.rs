//! Database layer
//!
//! SQLite through sqlx. The schema is created by the embedded migrations in
//! [`migrations`]; data access goes through the traits in [`repositories`].
//!
//! ```ignore
//! use quillpress::config::DatabaseConfig;
//! use quillpress::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping};

/// Build an in-memory pool with the full schema applied
#[cfg(test)]
pub async fn migrated_test_pool() -> sqlx::SqlitePool {
    let pool = create_test_pool().await.expect("test pool");
    migrations::run_migrations(&pool).await.expect("migrations");
    pool
}
