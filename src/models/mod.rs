//! Data models
//!
//! Database entities (User, Post, Category, Tag, Comment, Contact, Session),
//! validated input payloads and the view types handed to templates and JSON
//! responses.

mod category;
mod comment;
mod contact;
mod like;
mod post;
mod session;
mod tag;
mod user;

pub use category::{category_path, Category, CategoryInput, CategoryWithCount};
pub use comment::{
    AdminComment, BulkDeleteResult, Comment, CommentInput, CommentNode, CommentThread,
    CommentWithAuthor,
};
pub use contact::{Contact, ContactInput, ReadFilter};
pub use like::LikeState;
pub use post::{
    post_path, ListParams, PagedResult, Post, PostDetail, PostFilter, PostInput, PostRecord,
    PostSort, PostStatus, PostSummary, TagRef, TermRef,
};
pub use session::Session;
pub use tag::{tag_path, Tag, TagInput, TagWithCount};
pub use user::{gravatar_url, Account, AuthorInfo, User, UserRole, UserWithStats};
