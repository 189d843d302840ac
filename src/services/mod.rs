//! Services layer - Business logic
//!
//! Services implement the business rules on top of the repositories and the
//! page cache:
//! - Validation and error classification
//! - Ownership and role checks
//! - Revalidating cached pages after mutations

pub mod category;
pub mod comment;
pub mod contact;
pub mod draft;
pub mod like;
pub mod media;
pub mod oauth;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod tag;
pub mod text;
pub mod user;

use std::collections::BTreeMap;
use validator::ValidationErrors;

pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError, MAX_COMMENT_DEPTH};
pub use contact::{ContactService, ContactServiceError};
pub use draft::{AutosaveOutcome, DraftInput, DraftService};
pub use like::{LikeService, LikeServiceError};
pub use media::{ImageTransform, MediaClient, MediaError, UploadedImage};
pub use oauth::{OAuthError, OAuthProfile, OAuthProvider, OAuthService};
pub use password::{hash_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use rate_limiter::{ContactRateLimiter, LoginRateLimiter};
pub use tag::{TagService, TagServiceError};
pub use text::{generate_slug, make_excerpt, sanitize_html, strip_html};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};

/// Messages of every failed field, keyed by field name
pub fn validation_details(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

/// Flatten validation errors into one readable sentence list
pub fn validation_message(errors: &ValidationErrors) -> String {
    validation_details(errors)
        .into_values()
        .flatten()
        .collect::<Vec<_>>()
        .join("; ")
}
