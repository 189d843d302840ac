//! User model
//!
//! Users sign in with a password or through an OAuth provider. A user may own
//! posts, comments and likes; deleting the user removes all of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Display name
    pub name: Option<String>,
    /// Avatar URL
    pub image: Option<String>,
    pub role: UserRole,
    /// Argon2 hash, absent for OAuth-only accounts
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a user that has not been stored yet
    pub fn new(email: String, name: Option<String>, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email,
            name,
            image: None,
            role,
            password_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Owners and admins may change a piece of content
    pub fn can_edit(&self, owner_id: i64) -> bool {
        self.is_admin() || self.id == owner_id
    }

    /// Name to show next to posts and comments
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Avatar URL, falling back to Gravatar
    pub fn avatar_url(&self) -> String {
        match self.image.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => gravatar_url(&self.email),
        }
    }
}

/// Gravatar URL derived from an email address
pub fn gravatar_url(email: &str) -> String {
    let hash = format!("{:x}", md5::compute(email.trim().to_lowercase()));
    format!("https://www.gravatar.com/avatar/{}?d=mp&s=80", hash)
}

/// Public author details embedded in posts and comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub id: i64,
    pub name: String,
    pub avatar_url: String,
}

impl AuthorInfo {
    /// Build from the joined user columns of a post or comment row
    pub fn from_columns(id: i64, name: Option<String>, email: &str, image: Option<String>) -> Self {
        let mut user = User::new(email.to_string(), name, UserRole::User);
        user.id = id;
        user.image = image;
        Self::from(&user)
    }
}

impl From<&User> for AuthorInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.display_name(),
            avatar_url: user.avatar_url(),
        }
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(UserRole::User),
            "ADMIN" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Link between a user and an OAuth provider identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub provider: String,
    pub provider_account_id: String,
    pub created_at: DateTime<Utc>,
}

/// User row with activity counters for the admin panel
#[derive(Debug, Clone, Serialize)]
pub struct UserWithStats {
    #[serde(flatten)]
    pub user: User,
    pub post_count: i64,
    pub comment_count: i64,
}
