//! Category service
//!
//! Implements business logic for category management:
//! - Create, update, delete categories
//! - Name and slug uniqueness
//! - The cached category list with post counts

use crate::cache::{CacheLayer, MemoryCache, CATEGORIES_KEY};
use crate::db::repositories::CategoryRepository;
use crate::models::{category_path, Category, CategoryInput, CategoryWithCount};
use crate::services::text::generate_slug;
use crate::services::validation_message;
use std::sync::Arc;
use validator::Validate;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service for managing blog categories
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<MemoryCache>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<MemoryCache>) -> Self {
        Self { repo, cache }
    }

    /// Create a new category.
    ///
    /// The slug is derived from the name when not given.
    pub async fn create(&self, input: CategoryInput) -> Result<Category, CategoryServiceError> {
        let (name, slug, description) = self.check_input(input, None).await?;

        let created = self.repo.create(&name, &slug, description.as_deref()).await?;

        self.cache.invalidate_taxonomy().await;
        tracing::info!(category_id = created.id, slug = %created.slug, "Category created");
        Ok(created)
    }

    pub async fn update(&self, id: i64, input: CategoryInput) -> Result<Category, CategoryServiceError> {
        let existing = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;
        let (name, slug, description) = self.check_input(input, Some(id)).await?;

        let updated = self
            .repo
            .update(id, &name, &slug, description.as_deref())
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;

        self.revalidate(&existing).await;
        if updated.slug != existing.slug {
            self.cache.revalidate_path(&updated.path()).await;
        }
        Ok(updated)
    }

    /// Delete a category; its posts stay and lose the link
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let existing = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;

        self.repo.delete(id).await?;
        self.revalidate(&existing).await;
        tracing::info!(category_id = id, "Category deleted");
        Ok(())
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_slug(slug).await?)
    }

    /// All categories with published post counts, served from the cache
    pub async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        if let Ok(Some(list)) = self.cache.get::<Vec<CategoryWithCount>>(CATEGORIES_KEY).await {
            return Ok(list);
        }

        let list = self.repo.list_with_counts().await?;
        if let Err(e) = self.cache.set(CATEGORIES_KEY, &list, self.cache.default_ttl()).await {
            tracing::warn!("Failed to cache category list: {}", e);
        }
        Ok(list)
    }

    /// Validate input and check uniqueness, returning name, slug and description
    async fn check_input(
        &self,
        input: CategoryInput,
        exclude_id: Option<i64>,
    ) -> Result<(String, String, Option<String>), CategoryServiceError> {
        input
            .validate()
            .map_err(|e| CategoryServiceError::ValidationError(validation_message(&e)))?;

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError("Name is required".to_string()));
        }

        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => generate_slug(slug),
            None => generate_slug(&name),
        };
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Name must contain at least one letter or digit".to_string(),
            ));
        }

        if self.repo.name_exists(&name, exclude_id).await? {
            return Err(CategoryServiceError::DuplicateName(name));
        }
        if self.repo.slug_exists(&slug, exclude_id).await? {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }

        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Ok((name, slug, description))
    }

    /// Posts show their category names, so every post page may be stale
    async fn revalidate(&self, category: &Category) {
        self.cache.invalidate_taxonomy().await;
        self.cache.revalidate_path(&category_path(&category.slug)).await;
        self.cache.revalidate_path("/").await;
        self.cache.revalidate_prefix("/posts/").await;
    }
}
