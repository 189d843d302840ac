//! Cache layer
//!
//! An in-process moka cache holding rendered public pages and the taxonomy
//! lists served to the search filters.
//!
//! Keys:
//! - `page:<path>` for a rendered page, `page:<path>?<query>` for its
//!   paginated variants
//! - [`CATEGORIES_KEY`] and [`TAGS_KEY`] for the JSON taxonomy lists
//!
//! Mutations drop stale entries through [`MemoryCache::revalidate_path`] and
//! [`MemoryCache::revalidate_prefix`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use quillpress::cache::{create_cache, CacheLayer};
//!
//! let cache = create_cache(&config.cache);
//! cache.set(&page_key("/"), &html, cache.default_ttl()).await?;
//! cache.revalidate_path("/").await;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Key of the cached category list
pub const CATEGORIES_KEY: &str = "taxonomy:categories";

/// Key of the cached tag list
pub const TAGS_KEY: &str = "taxonomy:tags";

/// Cache layer trait
///
/// The methods are generic over the cached value, so the trait is used
/// through concrete types rather than as a trait object.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values matching a glob pattern (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

/// Cache key of a rendered page
pub fn page_key(path: &str) -> String {
    format!("page:{}", path)
}

impl MemoryCache {
    /// Drop the cached rendering of `path` and its paginated variants
    pub async fn revalidate_path(&self, path: &str) {
        let key = page_key(path);
        let variants = format!("{}?", key);
        self.delete_where(|k| k == key || k.starts_with(&variants)).await;
        tracing::debug!("Revalidated {}", path);
    }

    /// Drop every cached page whose path starts with `prefix`
    pub async fn revalidate_prefix(&self, prefix: &str) {
        let prefix_key = page_key(prefix);
        self.delete_where(|k| k.starts_with(&prefix_key)).await;
        tracing::debug!("Revalidated prefix {}", prefix);
    }

    /// Drop the cached category and tag lists
    pub async fn invalidate_taxonomy(&self) {
        for key in [CATEGORIES_KEY, TAGS_KEY] {
            if let Err(e) = self.delete(key).await {
                tracing::warn!("Failed to invalidate {}: {}", key, e);
            }
        }
    }
}

/// Create the cache described by `config`
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    tracing::info!(
        "Using in-memory cache (capacity {}, ttl {}s)",
        config.max_capacity,
        config.ttl_seconds
    );
    Arc::new(MemoryCache::new(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> Arc<MemoryCache> {
        create_cache(&CacheConfig {
            ttl_seconds: 60,
            max_capacity: 100,
        })
    }

    #[tokio::test]
    async fn test_create_cache_uses_config_ttl() {
        let cache = test_cache();
        assert_eq!(cache.default_ttl(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_revalidate_path_drops_page_and_variants() {
        let cache = test_cache();
        let ttl = cache.default_ttl();
        cache.set(&page_key("/"), &"home", ttl).await.unwrap();
        cache.set(&page_key("/?page=2"), &"home 2", ttl).await.unwrap();
        cache.set(&page_key("/posts/hello"), &"post", ttl).await.unwrap();

        cache.revalidate_path("/").await;

        assert_eq!(cache.get::<String>(&page_key("/")).await.unwrap(), None);
        assert_eq!(cache.get::<String>(&page_key("/?page=2")).await.unwrap(), None);
        assert_eq!(
            cache.get::<String>(&page_key("/posts/hello")).await.unwrap().as_deref(),
            Some("post")
        );
    }

    #[tokio::test]
    async fn test_revalidate_path_leaves_similar_paths() {
        let cache = test_cache();
        let ttl = cache.default_ttl();
        cache.set(&page_key("/posts/a"), &"a", ttl).await.unwrap();
        cache.set(&page_key("/posts/a?page=2"), &"a 2", ttl).await.unwrap();
        cache.set(&page_key("/posts/about"), &"about", ttl).await.unwrap();
        cache.set(&page_key("/about"), &"about page", ttl).await.unwrap();

        cache.revalidate_path("/posts/a").await;
        cache.revalidate_path("/").await;

        assert_eq!(cache.get::<String>(&page_key("/posts/a")).await.unwrap(), None);
        assert_eq!(cache.get::<String>(&page_key("/posts/a?page=2")).await.unwrap(), None);
        assert_eq!(
            cache.get::<String>(&page_key("/posts/about")).await.unwrap().as_deref(),
            Some("about")
        );
        assert_eq!(
            cache.get::<String>(&page_key("/about")).await.unwrap().as_deref(),
            Some("about page")
        );
    }

    #[tokio::test]
    async fn test_revalidate_prefix() {
        let cache = test_cache();
        let ttl = cache.default_ttl();
        cache.set(&page_key("/tags/rust"), &1, ttl).await.unwrap();
        cache.set(&page_key("/tags/web?page=3"), &2, ttl).await.unwrap();
        cache.set(&page_key("/categories/news"), &3, ttl).await.unwrap();

        cache.revalidate_prefix("/tags/").await;

        assert_eq!(cache.get::<i32>(&page_key("/tags/rust")).await.unwrap(), None);
        assert_eq!(cache.get::<i32>(&page_key("/tags/web?page=3")).await.unwrap(), None);
        assert_eq!(cache.get::<i32>(&page_key("/categories/news")).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_invalidate_taxonomy() {
        let cache = test_cache();
        let ttl = cache.default_ttl();
        cache.set(CATEGORIES_KEY, &vec!["news"], ttl).await.unwrap();
        cache.set(TAGS_KEY, &vec!["rust"], ttl).await.unwrap();

        cache.invalidate_taxonomy().await;

        assert!(cache.get::<Vec<String>>(CATEGORIES_KEY).await.unwrap().is_none());
        assert!(cache.get::<Vec<String>>(TAGS_KEY).await.unwrap().is_none());
    }
}
