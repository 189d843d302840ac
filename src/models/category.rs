//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Category entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn path(&self) -> String {
        category_path(&self.slug)
    }
}

pub fn category_path(slug: &str) -> String {
    format!("/categories/{}", slug)
}

/// Category with the number of published posts filed under it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub post_count: i64,
}

/// Admin form payload for a category
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 60, message = "Name must be between 1 and 60 characters"))]
    pub name: String,
    /// Derived from the name when empty
    #[serde(default)]
    #[validate(length(max = 80, message = "Slug must be at most 80 characters"))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(max = 300, message = "Description must be at most 300 characters"))]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_input_validation() {
        let input = CategoryInput {
            name: "Rust".into(),
            ..CategoryInput::default()
        };
        assert!(input.validate().is_ok());

        let too_long = CategoryInput {
            name: "x".repeat(61),
            ..CategoryInput::default()
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_category_path() {
        assert_eq!(category_path("rust"), "/categories/rust");
    }
}
