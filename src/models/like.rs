//! Like model

use serde::{Deserialize, Serialize};

/// Like state of a post as seen by one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}
