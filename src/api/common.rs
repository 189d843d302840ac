//! Common API utilities and shared request types

use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::api::ApiError;
use crate::models::{ListParams, PostFilter, PostSort, PostStatus};

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for public APIs
pub fn default_page_size() -> u32 {
    10
}

/// Default page size for admin APIs
pub fn default_per_page() -> u32 {
    20
}

/// Basic pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub per_page: u32,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Admin list query: pagination plus a free-text search
#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub q: Option<String>,
}

impl AdminListQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }

    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// Body of the bulk admin actions.
///
/// Each id becomes one bound SQL parameter, so selections are capped.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IdsRequest {
    #[validate(length(max = 500, message = "At most 500 items can be changed at once"))]
    pub ids: Vec<i64>,
}

/// Post search as sent in a query string.
///
/// Lists are comma separated (`category=rust,web`); dates are `YYYY-MM-DD`.
#[derive(Debug, Default, Deserialize)]
pub struct PostSearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub author: Option<i64>,
    #[serde(default)]
    pub featured: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl PostSearchQuery {
    /// Parse into a filter; malformed dates, sorts or statuses are validation errors
    pub fn to_filter(&self) -> Result<PostFilter, ApiError> {
        let status = match non_blank(&self.status) {
            Some(s) => Some(s.parse::<PostStatus>().map_err(ApiError::validation_error)?),
            None => None,
        };
        let sort = match non_blank(&self.sort) {
            Some("latest") | None => PostSort::Latest,
            Some("oldest") => PostSort::Oldest,
            Some("title") => PostSort::Title,
            Some(other) => {
                return Err(ApiError::validation_error(format!("Unknown sort order: {}", other)))
            }
        };

        Ok(PostFilter {
            query: non_blank(&self.q).map(str::to_string),
            categories: split_list(&self.category),
            tags: split_list(&self.tag),
            author_id: self.author,
            status,
            featured: self.featured.filter(|f| *f),
            from: parse_date(&self.from, "from")?,
            to: parse_date(&self.to, "to")?,
            sort,
        })
    }

    pub fn params(&self, default_per_page: u32) -> ListParams {
        ListParams::new(self.page, self.per_page.unwrap_or(default_per_page))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn split_list(value: &Option<String>) -> Vec<String> {
    non_blank(value)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_date(value: &Option<String>, field: &str) -> Result<Option<NaiveDate>, ApiError> {
    match non_blank(value) {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Some).map_err(|_| {
            ApiError::with_details(
                "VALIDATION_ERROR",
                format!("Invalid date \"{}\", expected YYYY-MM-DD", s),
                serde_json::json!({ field: [format!("Invalid date: {}", s)] }),
            )
        }),
        None => Ok(None),
    }
}
