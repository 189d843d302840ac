//! User service
//!
//! Business logic for accounts and sessions:
//! - Registration with email and password; the first user becomes admin
//! - Login / logout and session validation
//! - OAuth sign-in, linking provider identities to users
//! - Admin user management (roles, deletion)

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{ListParams, PagedResult, Session, User, UserRole, UserWithStats};
use crate::services::oauth::OAuthProfile;
use crate::services::password::{check_password_policy, hash_password, verify_password};
use crate::services::validation_message;
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(String),

    /// The action is not allowed for this actor or target
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    pub password: String,
}

/// Input for credential login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_days,
        }
    }

    /// Register a new user.
    ///
    /// The first user in the system is created as an admin.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        input
            .validate()
            .map_err(|e| UserServiceError::ValidationError(validation_message(&e)))?;
        check_password_policy(&input.password).map_err(UserServiceError::ValidationError)?;

        if self.user_repo.get_by_email(&input.email).await?.is_some() {
            return Err(UserServiceError::UserExists(
                "An account with this email already exists".to_string(),
            ));
        }

        let role = self.role_for_new_user().await?;
        let mut user = User::new(input.email.trim().to_string(), Some(input.name.trim().to_string()), role);
        user.password_hash = Some(hash_password(&input.password)?);

        let created = self.user_repo.create(&user).await?;
        tracing::info!(user_id = created.id, role = %created.role, "User registered");
        Ok(created)
    }

    /// Verify credentials and start a session
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid = || {
            UserServiceError::AuthenticationError("Invalid email or password".to_string())
        };

        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await?
            .ok_or_else(invalid)?;

        // OAuth-only accounts have no password
        let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
        if !verify_password(&input.password, hash).context("Failed to verify password")? {
            return Err(invalid());
        }

        let session = self.start_session(user.id).await?;
        Ok((user, session))
    }

    /// Invalidate a session
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo.delete(token).await?;
        Ok(())
    }

    pub async fn start_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(user_id, self.session_days);
        Ok(self.session_repo.create(&session).await?)
    }

    /// User behind a session token, `None` for unknown or expired sessions
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            self.session_repo.delete(token).await?;
            return Ok(None);
        }

        Ok(self.user_repo.get_by_id(session.user_id).await?)
    }

    /// Find or create the user for an OAuth identity.
    ///
    /// An identity already linked signs into its user. Otherwise it is linked
    /// to the user with the same email, or to a newly created user.
    pub async fn sign_in_oauth(&self, profile: &OAuthProfile) -> Result<User, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .find_by_account(&profile.provider, &profile.provider_account_id)
            .await?
        {
            return Ok(user);
        }

        let user = match self.user_repo.get_by_email(&profile.email).await? {
            Some(existing) => {
                if existing.image.is_none() && profile.image.is_some() {
                    self.user_repo
                        .update_profile(existing.id, None, profile.image.as_deref())
                        .await?;
                }
                existing
            }
            None => {
                let role = self.role_for_new_user().await?;
                let mut user = User::new(profile.email.clone(), profile.name.clone(), role);
                user.image = profile.image.clone();
                self.user_repo.create(&user).await?
            }
        };

        self.user_repo
            .link_account(user.id, &profile.provider, &profile.provider_account_id)
            .await?;
        tracing::info!(user_id = user.id, provider = %profile.provider, "OAuth account linked");

        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await?)
    }

    pub async fn list(
        &self,
        search: Option<&str>,
        params: &ListParams,
    ) -> Result<PagedResult<UserWithStats>, UserServiceError> {
        let (users, total) = self.user_repo.list(search, params).await?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Change a user's role. The last admin cannot be demoted.
    pub async fn change_role(
        &self,
        id: i64,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(id.to_string()))?;

        if user.is_admin() && role != UserRole::Admin && self.user_repo.count_admins().await? <= 1 {
            return Err(UserServiceError::Forbidden(
                "Cannot demote the last administrator".to_string(),
            ));
        }

        self.user_repo.update_role(id, role).await?;
        self.session_repo.delete_by_user(id).await?;
        tracing::info!(user_id = id, role = %role, "User role changed");

        Ok(User { role, ..user })
    }

    /// Delete a user and everything they own. Admins cannot delete themselves.
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), UserServiceError> {
        if actor.id == id {
            return Err(UserServiceError::Forbidden(
                "You cannot delete your own account".to_string(),
            ));
        }

        if !self.user_repo.delete(id).await? {
            return Err(UserServiceError::NotFound(id.to_string()));
        }
        tracing::info!(user_id = id, deleted_by = actor.id, "User deleted");
        Ok(())
    }

    /// Delete expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self.session_repo.delete_expired().await?)
    }

    async fn role_for_new_user(&self) -> Result<UserRole, UserServiceError> {
        Ok(if self.user_repo.count().await? == 0 {
            UserRole::Admin
        } else {
            UserRole::User
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};

    async fn service() -> UserService {
        let pool = crate::db::migrated_test_pool().await;
        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
            7,
        )
    }

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            email: email.to_string(),
            name: "Reader".to_string(),
            password: "password123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_user_becomes_admin() {
        let service = service().await;
        let first = service.register(register_input("first@example.com")).await.unwrap();
        let second = service.register(register_input("second@example.com")).await.unwrap();
        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = service().await;

        let bad_email = service.register(register_input("nope")).await;
        assert!(matches!(bad_email, Err(UserServiceError::ValidationError(_))));

        let mut short = register_input("a@example.com");
        short.password = "short".into();
        assert!(matches!(
            service.register(short).await,
            Err(UserServiceError::ValidationError(_))
        ));

        service.register(register_input("a@example.com")).await.unwrap();
        assert!(matches!(
            service.register(register_input("A@example.com")).await,
            Err(UserServiceError::UserExists(_))
        ));
    }

    #[tokio::test]
    async fn test_login_and_session_lifecycle() {
        let service = service().await;
        service.register(register_input("a@example.com")).await.unwrap();

        let wrong = service
            .login(LoginInput {
                email: "a@example.com".into(),
                password: "wrong-password".into(),
            })
            .await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        let (user, session) = service
            .login(LoginInput {
                email: "a@example.com".into(),
                password: "password123".into(),
            })
            .await
            .unwrap();

        let current = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(current.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oauth_sign_in_links_accounts() {
        let service = service().await;
        let existing = service.register(register_input("gh@example.com")).await.unwrap();

        let profile = OAuthProfile {
            provider: "github".into(),
            provider_account_id: "1001".into(),
            email: "gh@example.com".into(),
            name: Some("Octo".into()),
            image: Some("https://avatars.example.com/1".into()),
        };
        let user = service.sign_in_oauth(&profile).await.unwrap();
        assert_eq!(user.id, existing.id);

        let again = service.sign_in_oauth(&profile).await.unwrap();
        assert_eq!(again.id, existing.id);

        let newcomer = OAuthProfile {
            provider: "google".into(),
            provider_account_id: "g-1".into(),
            email: "new@example.com".into(),
            name: None,
            image: None,
        };
        let created = service.sign_in_oauth(&newcomer).await.unwrap();
        assert_ne!(created.id, existing.id);
        assert_eq!(created.role, UserRole::User);
        assert!(created.password_hash.is_none());
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_demoted() {
        let service = service().await;
        let admin = service.register(register_input("admin@example.com")).await.unwrap();
        let user = service.register(register_input("user@example.com")).await.unwrap();

        assert!(matches!(
            service.change_role(admin.id, UserRole::User).await,
            Err(UserServiceError::Forbidden(_))
        ));

        service.change_role(user.id, UserRole::Admin).await.unwrap();
        let demoted = service.change_role(admin.id, UserRole::User).await.unwrap();
        assert_eq!(demoted.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_delete_user() {
        let service = service().await;
        let admin = service.register(register_input("admin@example.com")).await.unwrap();
        let user = service.register(register_input("user@example.com")).await.unwrap();

        assert!(matches!(
            service.delete(&admin, admin.id).await,
            Err(UserServiceError::Forbidden(_))
        ));
        service.delete(&admin, user.id).await.unwrap();
        assert!(service.get_by_id(user.id).await.unwrap().is_none());
        assert!(matches!(
            service.delete(&admin, user.id).await,
            Err(UserServiceError::NotFound(_))
        ));
    }
}
