//! Tag service
//!
//! Implements business logic for tag management:
//! - Admin create, rename and delete
//! - Reusing or creating tags from the free-form names typed in the editor
//! - The cached tag list with post counts

use crate::cache::{CacheLayer, MemoryCache, TAGS_KEY};
use crate::db::repositories::TagRepository;
use crate::models::{tag_path, Tag, TagInput, TagRef, TagWithCount};
use crate::services::text::generate_slug;
use crate::services::validation_message;
use std::sync::Arc;
use validator::Validate;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag name already exists: {0}")]
    DuplicateName(String),

    #[error("Tag slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tag service for managing blog tags
pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: Arc<MemoryCache>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, cache: Arc<MemoryCache>) -> Self {
        Self { repo, cache }
    }

    pub async fn create(&self, input: TagInput) -> Result<Tag, TagServiceError> {
        let (name, slug) = self.check_input(input, None).await?;
        let tag = self.repo.create(&name, &slug).await?;

        self.cache.invalidate_taxonomy().await;
        tracing::info!(tag_id = tag.id, slug = %tag.slug, "Tag created");
        Ok(tag)
    }

    pub async fn update(&self, id: i64, input: TagInput) -> Result<Tag, TagServiceError> {
        let existing = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| TagServiceError::NotFound(id.to_string()))?;
        let (name, slug) = self.check_input(input, Some(id)).await?;

        let tag = self
            .repo
            .update(id, &name, &slug)
            .await?
            .ok_or_else(|| TagServiceError::NotFound(id.to_string()))?;

        self.revalidate(&existing).await;
        if tag.slug != existing.slug {
            self.cache.revalidate_path(&tag.path()).await;
        }
        Ok(tag)
    }

    /// Delete a tag; tagged posts stay
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        let existing = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| TagServiceError::NotFound(id.to_string()))?;

        self.repo.delete(id).await?;
        self.revalidate(&existing).await;
        tracing::info!(tag_id = id, "Tag deleted");
        Ok(())
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>, TagServiceError> {
        Ok(self.repo.get_by_slug(slug).await?)
    }

    /// All tags with published post counts, served from the cache
    pub async fn list_with_counts(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        if let Ok(Some(list)) = self.cache.get::<Vec<TagWithCount>>(TAGS_KEY).await {
            return Ok(list);
        }

        let list = self.repo.list_with_counts().await?;
        if let Err(e) = self.cache.set(TAGS_KEY, &list, self.cache.default_ttl()).await {
            tracing::warn!("Failed to cache tag list: {}", e);
        }
        Ok(list)
    }

    /// Existing tags for the given names, creating the missing ones.
    ///
    /// Names that collapse to the same slug yield one tag.
    pub async fn find_or_create_many(&self, names: &[String]) -> Result<Vec<Tag>, TagServiceError> {
        let refs: Vec<TagRef> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(|name| TagRef {
                name: name.to_string(),
                slug: generate_slug(name),
            })
            .filter(|r| !r.slug.is_empty())
            .collect();
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        let tags = self.repo.find_or_create_many(&refs).await?;
        self.cache.invalidate_taxonomy().await;
        Ok(tags)
    }

    async fn check_input(
        &self,
        input: TagInput,
        exclude_id: Option<i64>,
    ) -> Result<(String, String), TagServiceError> {
        input
            .validate()
            .map_err(|e| TagServiceError::ValidationError(validation_message(&e)))?;

        let name = input.name.trim().to_string();
        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => generate_slug(slug),
            None => generate_slug(&name),
        };
        if name.is_empty() || slug.is_empty() {
            return Err(TagServiceError::ValidationError(
                "Name must contain at least one letter or digit".to_string(),
            ));
        }

        if self.repo.name_exists(&name, exclude_id).await? {
            return Err(TagServiceError::DuplicateName(name));
        }
        if self.repo.slug_exists(&slug, exclude_id).await? {
            return Err(TagServiceError::DuplicateSlug(slug));
        }
        Ok((name, slug))
    }

    async fn revalidate(&self, tag: &Tag) {
        self.cache.invalidate_taxonomy().await;
        self.cache.revalidate_path(&tag_path(&tag.slug)).await;
        self.cache.revalidate_path("/").await;
        self.cache.revalidate_prefix("/posts/").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::SqlxTagRepository;

    async fn service() -> TagService {
        let pool = migrated_test_pool().await;
        TagService::new(
            SqlxTagRepository::boxed(pool),
            crate::cache::create_cache(&CacheConfig::default()),
        )
    }

    fn input(name: &str) -> TagInput {
        TagInput {
            name: name.to_string(),
            slug: None,
        }
    }

    #[tokio::test]
    async fn test_find_or_create_many_reuses_tags() {
        let service = service().await;
        let rust = service.create(input("Rust")).await.unwrap();

        let tags = service
            .find_or_create_many(&["rust".into(), "Async Rust".into(), "  ".into(), "async-rust".into()])
            .await
            .unwrap();
        let slugs: Vec<&str> = tags.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(tags.len(), 2);
        assert!(slugs.contains(&"rust") && slugs.contains(&"async-rust"));
        assert!(tags.iter().any(|t| t.id == rust.id));

        assert_eq!(service.list_with_counts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_crud_and_uniqueness() {
        let service = service().await;
        let tag = service.create(input("Databases")).await.unwrap();
        assert!(matches!(
            service.create(input("DATABASES")).await,
            Err(TagServiceError::DuplicateName(_))
        ));

        let renamed = service.update(tag.id, input("SQL")).await.unwrap();
        assert_eq!(renamed.slug, "sql");
        assert!(service.get_by_slug("databases").await.unwrap().is_none());

        service.delete(tag.id).await.unwrap();
        assert!(matches!(
            service.update(tag.id, input("Gone")).await,
            Err(TagServiceError::NotFound(_))
        ));
    }
}
