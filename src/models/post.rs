//! Post model
//!
//! This module provides:
//! - `Post` entity and its `PostStatus`
//! - `PostSummary` / `PostDetail` views used by listings and the post page
//! - `PostInput` validated editor payload
//! - `PostFilter` search criteria, including the published date range
//! - `ListParams` / `PagedResult` pagination types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::AuthorInfo;

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// HTML content
    pub content: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub status: PostStatus,
    pub featured: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Public path of the post page
    pub fn path(&self) -> String {
        post_path(&self.slug)
    }

    pub fn is_public(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// Path of a post page for a slug
pub fn post_path(slug: &str) -> String {
    format!("/posts/{}", slug)
}

/// Publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostStatus {
    /// Not visible to the public
    #[default]
    Draft,
    /// Visible to the public
    Published,
    /// Becomes visible once `published_at` has passed
    Scheduled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "DRAFT",
            PostStatus::Published => "PUBLISHED",
            PostStatus::Scheduled => "SCHEDULED",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(PostStatus::Draft),
            "PUBLISHED" => Ok(PostStatus::Published),
            "SCHEDULED" => Ok(PostStatus::Scheduled),
            _ => Err(format!("Invalid post status: {}", s)),
        }
    }
}

/// Category or tag reference embedded in a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Post as shown in listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub status: PostStatus,
    pub featured: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: AuthorInfo,
    #[serde(default)]
    pub categories: Vec<TermRef>,
    #[serde(default)]
    pub tags: Vec<TermRef>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
}

/// Post as shown on its own page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub summary: PostSummary,
    pub content: String,
    /// Whether the current viewer has liked the post
    #[serde(default)]
    pub liked_by_viewer: bool,
}

/// Editor payload for creating or updating a post
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PostInput {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    /// Explicit slug; derived from the title when empty
    #[serde(default)]
    #[validate(length(max = 200, message = "Slug must be at most 200 characters"))]
    pub slug: Option<String>,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "Excerpt must be at most 500 characters"))]
    pub excerpt: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Cover image must be a valid URL"))]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub featured: bool,
    /// Publication time for scheduled posts
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    /// Tag names; unknown tags are created
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Values written to the `posts` row by the repository
#[derive(Debug, Clone)]
pub struct PostRecord {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub status: PostStatus,
    pub featured: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: i64,
}

/// Tag to link to a post, created when missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    pub slug: String,
}

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    #[default]
    Latest,
    Oldest,
    Title,
}

/// Search and filter criteria for post listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilter {
    /// Keyword matched against title, excerpt and content
    #[serde(default)]
    pub query: Option<String>,
    /// Category slugs; a post matches if it has any of them
    #[serde(default)]
    pub categories: Vec<String>,
    /// Tag slugs; a post matches if it has any of them
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author_id: Option<i64>,
    /// `None` matches every status
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub featured: Option<bool>,
    /// First day of the published range (inclusive)
    #[serde(default)]
    pub from: Option<NaiveDate>,
    /// Last day of the published range (inclusive)
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub sort: PostSort,
}

impl PostFilter {
    /// Filter for what the public may see
    pub fn published() -> Self {
        Self {
            status: Some(PostStatus::Published),
            ..Self::default()
        }
    }

    /// Half-open `[start, end)` bounds on `published_at` covering whole days
    pub fn published_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let start = self
            .from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        let end = self
            .to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        (start, end)
    }

    /// Trimmed keyword, `None` when blank
    pub fn keyword(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        let per_page = params.per_page.max(1) as i64;
        let total_pages = ((total.max(0) + per_page - 1) / per_page) as u32;
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("published".parse::<PostStatus>().unwrap(), PostStatus::Published);
        assert_eq!(PostStatus::Scheduled.to_string(), "SCHEDULED");
        assert!("archived".parse::<PostStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&PostStatus::Draft).unwrap(),
            "\"DRAFT\""
        );
    }

    #[test]
    fn test_published_bounds_cover_whole_days() {
        let filter = PostFilter {
            from: NaiveDate::from_ymd_opt(2024, 3, 1),
            to: NaiveDate::from_ymd_opt(2024, 3, 31),
            ..PostFilter::default()
        };
        let (start, end) = filter.published_bounds();
        assert_eq!(start, Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
        assert_eq!(end, Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_keyword_ignores_blank() {
        let mut filter = PostFilter::default();
        filter.query = Some("   ".into());
        assert_eq!(filter.keyword(), None);
        filter.query = Some(" rust ".into());
        assert_eq!(filter.keyword(), Some("rust"));
    }

    #[test]
    fn test_post_input_validation() {
        let input = PostInput {
            title: String::new(),
            content: "<p>hi</p>".into(),
            ..PostInput::default()
        };
        assert!(input.validate().is_err());

        let input = PostInput {
            title: "Hello".into(),
            content: "<p>hi</p>".into(),
            cover_image: Some("not a url".into()),
            ..PostInput::default()
        };
        assert!(input.validate().is_err());

        let input = PostInput {
            title: "Hello".into(),
            content: "<p>hi</p>".into(),
            cover_image: Some("https://ik.imagekit.io/demo/cover.jpg".into()),
            ..PostInput::default()
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_paged_result_pages() {
        let params = ListParams::new(2, 10);
        let page = PagedResult::new(vec![1, 2, 3], 23, &params);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());
        assert!(page.has_prev());

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, &ListParams::default());
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn list_params_are_clamped(page in 0u32..1000, per_page in 0u32..1000) {
            let params = ListParams::new(page, per_page);
            prop_assert!(params.page >= 1);
            prop_assert!((1..=100).contains(&params.per_page));
            prop_assert_eq!(params.offset(), (params.page as i64 - 1) * params.per_page as i64);
        }

        #[test]
        fn published_bounds_contain_every_instant_of_range(
            day in 0i64..3000,
            span in 0i64..60,
            secs in 0u32..86_400,
        ) {
            let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(day);
            let to = from + chrono::Duration::days(span);
            let filter = PostFilter { from: Some(from), to: Some(to), ..PostFilter::default() };
            let (start, end) = filter.published_bounds();
            let (start, end) = (start.unwrap(), end.unwrap());

            let last_day_instant = to
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc() + chrono::Duration::seconds(secs as i64);
            prop_assert!(start <= last_day_instant && last_day_instant < end);
            prop_assert!(end - start == chrono::Duration::days(span + 1));
        }
    }
}
