//! User service
//!
//! Registration, login/logout and session management. Passwords are
//! stored as Argon2id PHC strings with a fresh random salt per hash.
//! The first registered user becomes the administrator.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, User, UserRole};
use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Duration;
use std::sync::Arc;
use tracing::info;

/// Default session lifetime in days
const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Session missing or expired
    #[error("Session expired")]
    SessionExpired,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for registration and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_ttl: Duration,
}

impl UserService {
    /// Create a new user service
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
        }
    }

    /// Register a new user. The first user in the system is made admin.
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let username = input.username.trim();
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        if !input.email.contains('@') {
            return Err(UserServiceError::ValidationError(
                "Invalid email address".to_string(),
            ));
        }
        if input.password.len() < 8 {
            return Err(UserServiceError::ValidationError(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        if self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }
        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let is_first = self.user_repo.count().await.context("Failed to count users")? == 0;
        let role = if is_first {
            UserRole::Admin
        } else {
            UserRole::Author
        };

        let password_hash = hash_password(&input.password)?;
        let user = User::new(username.to_string(), input.email, password_hash, role);
        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        info!(username = %created.username, role = %created.role, "Registered user");
        Ok(created)
    }

    /// Login with username or email, returning a fresh session
    pub async fn login(
        &self,
        username_or_email: &str,
        password: &str,
    ) -> Result<(User, Session), UserServiceError> {
        let user = if username_or_email.contains('@') {
            self.user_repo.get_by_email(username_or_email).await
        } else {
            self.user_repo.get_by_username(username_or_email).await
        }
        .context("Failed to look up user")?
        .ok_or_else(|| {
            UserServiceError::AuthenticationError("Invalid username or password".to_string())
        })?;

        if !verify_password(password, &user.password_hash)? {
            return Err(UserServiceError::AuthenticationError(
                "Invalid username or password".to_string(),
            ));
        }
        if !user.is_active {
            return Err(UserServiceError::AuthenticationError(
                "Account is disabled".to_string(),
            ));
        }

        let session = Session::new(user.id, self.session_ttl);
        self.session_repo
            .create(&session)
            .await
            .context("Failed to store session")?;

        Ok((user, session))
    }

    /// Logout by dropping the session
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Expired sessions are deleted on sight and reported as
    /// `SessionExpired`.
    pub async fn authenticate(&self, session_id: &str) -> Result<User, UserServiceError> {
        let session = self
            .session_repo
            .get(session_id)
            .await
            .context("Failed to load session")?
            .ok_or(UserServiceError::SessionExpired)?;

        if session.is_expired() {
            self.session_repo
                .delete(session_id)
                .await
                .context("Failed to drop expired session")?;
            return Err(UserServiceError::SessionExpired);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to load session user")?
            .ok_or(UserServiceError::SessionExpired)?;

        if !user.is_active {
            return Err(UserServiceError::AuthenticationError(
                "Account is disabled".to_string(),
            ));
        }
        Ok(user)
    }

    /// Get a user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")
            .map_err(Into::into)
    }

    /// Delete all expired sessions
    pub async fn cleanup_sessions(&self) -> Result<u64, UserServiceError> {
        self.session_repo
            .delete_expired()
            .await
            .context("Failed to clean up sessions")
            .map_err(Into::into)
    }
}

/// Hash a password using Argon2id with a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash string
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use sqlx::SqlitePool;

    async fn setup_test_service() -> (SqlitePool, UserService) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    fn input(username: &str, email: &str) -> CreateUserInput {
        CreateUserInput {
            username: username.to_string(),
            email: email.to_string(),
            password: "correct horse battery".to_string(),
        }
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_first_user_becomes_admin() {
        let (_pool, service) = setup_test_service().await;

        let first = service.register(input("alice", "alice@example.com")).await.unwrap();
        let second = service.register(input("bob", "bob@example.com")).await.unwrap();

        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::Author);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let (_pool, service) = setup_test_service().await;

        service.register(input("alice", "alice@example.com")).await.unwrap();

        let dup_name = service.register(input("alice", "other@example.com")).await;
        assert!(matches!(dup_name, Err(UserServiceError::UserExists(_))));

        let dup_email = service.register(input("other", "alice@example.com")).await;
        assert!(matches!(dup_email, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (_pool, service) = setup_test_service().await;

        let bad_email = service
            .register(CreateUserInput {
                username: "alice".to_string(),
                email: "not-an-email".to_string(),
                password: "correct horse battery".to_string(),
            })
            .await;
        assert!(matches!(bad_email, Err(UserServiceError::ValidationError(_))));

        let short_password = service
            .register(CreateUserInput {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "short".to_string(),
            })
            .await;
        assert!(matches!(
            short_password,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_login_and_authenticate() {
        let (_pool, service) = setup_test_service().await;

        service.register(input("alice", "alice@example.com")).await.unwrap();

        let (user, session) = service
            .login("alice", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(user.username, "alice");

        let resolved = service.authenticate(&session.id).await.unwrap();
        assert_eq!(resolved.id, user.id);

        // Login by email works too
        service
            .login("alice@example.com", "correct horse battery")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password() {
        let (_pool, service) = setup_test_service().await;

        service.register(input("alice", "alice@example.com")).await.unwrap();

        let result = service.login("alice", "wrong password").await;
        assert!(matches!(
            result,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_pool, service) = setup_test_service().await;

        service.register(input("alice", "alice@example.com")).await.unwrap();
        let (_, session) = service
            .login("alice", "correct horse battery")
            .await
            .unwrap();

        service.logout(&session.id).await.unwrap();
        let result = service.authenticate(&session.id).await;
        assert!(matches!(result, Err(UserServiceError::SessionExpired)));
    }
}
