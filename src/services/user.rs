//! User service
//!
//! Business logic for staff accounts:
//! - registration (the first user becomes admin, then self-registration closes)
//! - login/logout with cookie session tokens and a paired CSRF token
//! - session validation
//! - admin-driven account creation for cashiers and managers

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for registration and account creation
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Input for login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// User service for managing staff accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    /// Register the bootstrap account.
    ///
    /// Only valid while the system has no users; the first account becomes
    /// admin and further registration is closed (staff accounts are created
    /// by an admin afterwards).
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        if !self.is_first_user().await? {
            return Err(UserServiceError::ValidationError(
                "Registration is closed; ask an administrator for an account".to_string(),
            ));
        }
        self.create_user(input, UserRole::Admin).await
    }

    /// Create a staff account with an explicit role
    pub async fn create_user(
        &self,
        input: RegisterInput,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        validate_credentials(&input.username, &input.password)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.username, password_hash, role);

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        Ok(created)
    }

    /// Login with credentials.
    ///
    /// Validates the provided credentials and creates a new session with a
    /// fresh CSRF token if valid.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to look up user")?
            .ok_or_else(|| {
                UserServiceError::AuthenticationError("Invalid username or password".to_string())
            })?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(UserServiceError::AuthenticationError(
                "Invalid username or password".to_string(),
            ));
        }

        if !user.active {
            return Err(UserServiceError::AuthenticationError(
                "Account is disabled. Please contact the administrator.".to_string(),
            ));
        }

        self.create_session(user.id).await
    }

    /// Logout (invalidate session)
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Validate session token and return the associated user.
    ///
    /// Expired sessions are cleaned up on sight. Returns the session too so
    /// callers can check the CSRF token.
    pub async fn validate_session(
        &self,
        token: &str,
    ) -> Result<Option<(User, Session)>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.map(|u| (u, session)))
    }

    /// Check if this is the first user (for bootstrap admin)
    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// List all staff accounts
    pub async fn list(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.list().await.context("Failed to list users")?)
    }

    /// Delete expired auth sessions, returning how many were removed
    pub async fn purge_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to purge expired sessions")?)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            csrf_token: Uuid::new_v4().to_string(),
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok(created)
    }
}

fn validate_credentials(username: &str, password: &str) -> Result<(), UserServiceError> {
    if username.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username must not be empty".to_string(),
        ));
    }
    if username.len() > 50 {
        return Err(UserServiceError::ValidationError(
            "Username must be at most 50 characters".to_string(),
        ));
    }
    if password.len() < 8 {
        return Err(UserServiceError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup_service() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        )
    }

    #[tokio::test]
    async fn test_first_registered_user_becomes_admin() {
        let service = setup_service().await;

        let user = service
            .register(RegisterInput::new("owner", "password123"))
            .await
            .expect("Registration failed");
        assert_eq!(user.role, UserRole::Admin);

        // Second registration is closed
        let result = service
            .register(RegisterInput::new("intruder", "password123"))
            .await;
        assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_create_user_with_role() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("owner", "password123"))
            .await
            .unwrap();

        let cashier = service
            .create_user(RegisterInput::new("anna", "password123"), UserRole::Cashier)
            .await
            .expect("Failed to create cashier");
        assert_eq!(cashier.role, UserRole::Cashier);

        let duplicate = service
            .create_user(RegisterInput::new("anna", "password123"), UserRole::Cashier)
            .await;
        assert!(matches!(duplicate, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let service = setup_service().await;
        let result = service.register(RegisterInput::new("owner", "short")).await;
        assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("owner", "password123"))
            .await
            .unwrap();

        let session = service
            .login(LoginInput::new("owner", "password123"))
            .await
            .expect("Login failed");
        assert!(!session.csrf_token.is_empty());

        let (user, validated) = service
            .validate_session(&session.id)
            .await
            .expect("Validation errored")
            .expect("Session should be valid");
        assert_eq!(user.username, "owner");
        assert_eq!(validated.csrf_token, session.csrf_token);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("owner", "password123"))
            .await
            .unwrap();

        let result = service.login(LoginInput::new("owner", "wrongpass123")).await;
        assert!(matches!(
            result,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("owner", "password123"))
            .await
            .unwrap();
        let session = service
            .login(LoginInput::new("owner", "password123"))
            .await
            .unwrap();

        service.logout(&session.id).await.expect("Logout failed");

        let validated = service.validate_session(&session.id).await.unwrap();
        assert!(validated.is_none());
    }

    #[tokio::test]
    async fn test_validate_unknown_session() {
        let service = setup_service().await;
        let validated = service.validate_session("no-such-token").await.unwrap();
        assert!(validated.is_none());
    }
}
