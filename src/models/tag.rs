//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Tag entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    pub fn path(&self) -> String {
        tag_path(&self.slug)
    }
}

pub fn tag_path(slug: &str) -> String {
    format!("/tags/{}", slug)
}

/// Tag with the number of published posts carrying it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub post_count: i64,
}

/// Admin form payload for a tag
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TagInput {
    #[validate(length(min = 1, max = 60, message = "Name must be between 1 and 60 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 80, message = "Slug must be at most 80 characters"))]
    pub slug: Option<String>,
}
