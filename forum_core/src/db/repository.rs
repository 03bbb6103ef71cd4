//! Repository trait definitions for testability and dependency injection.
//!
//! The traits are the storage contract the auth components depend on. Every
//! method that has to be atomic is a single method here, so implementations
//! can run it as one transaction (PostgreSQL) or under one lock (memory).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::auth::{
    AuthError, AuthProvider, AuthResult, ConflictField, Session, User, UserCredentials, UserId,
};

/// Trait for user repository operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find the id and password hash of the user whose username or email is `identifier`
    async fn find_credentials(&self, identifier: &str) -> AuthResult<Option<UserCredentials>>;

    /// Whether `username` is taken
    async fn username_exists(&self, username: &str) -> AuthResult<bool>;

    /// Insert a local account, checking both unique columns in the same transaction.
    ///
    /// # Errors
    ///
    /// * `AuthError::Conflict` - username or email already present
    async fn create_local_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<UserId>;

    /// Find the user linked to `(provider, provider_id)`
    async fn find_by_provider(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<UserId>>;

    /// Record `(provider, provider_id)` on the user owning `email`, in one statement.
    /// Returns `None` if nobody has that email.
    async fn link_provider_by_email(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<UserId>>;

    /// Insert an OAuth account with no password hash
    async fn create_oauth_user(
        &self,
        username: &str,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<UserId>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;
}

/// Trait for session repository operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Delete every session of `session.user_id` and insert `session`, atomically.
    ///
    /// # Errors
    ///
    /// * `AuthError::UserNotFound` - the owning user doesn't exist
    async fn replace_user_session(&self, session: &Session) -> AuthResult<()>;

    /// Find session by token. Never modifies the store.
    async fn find_session(&self, token: &str) -> AuthResult<Option<Session>>;

    /// Delete session by token. Deleting a missing token is not an error.
    async fn delete_session(&self, token: &str) -> AuthResult<()>;

    /// Delete sessions with `expires_at < cutoff`, returning how many went
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> AuthResult<u64>;

    /// Round-trip to the store
    async fn ping(&self) -> AuthResult<()>;
}

/// Map a unique-constraint violation to the field it protects.
///
/// Other errors pass through as storage errors.
pub(crate) fn map_unique_violation(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        let field = match db_err.constraint() {
            Some("users_username_key") => ConflictField::Username,
            Some("users_email_key") => ConflictField::Email,
            _ => ConflictField::ProviderIdentity,
        };
        return AuthError::Conflict(field);
    }
    AuthError::Storage(err)
}

fn user_from_row(row: &PgRow) -> User {
    let auth_type: String = row.get("auth_type");
    // A tag this build doesn't know about is treated like a local account
    let auth_type = auth_type.parse().unwrap_or(AuthProvider::Local);

    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        auth_type,
        provider_id: row.get("provider_id"),
        created_at: row.get("created_at"),
    }
}

/// Default PostgreSQL implementation of `UserRepository`
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_credentials(&self, identifier: &str) -> AuthResult<Option<UserCredentials>> {
        // Username wins over email if a legacy row makes both match
        let row = sqlx::query(
            "SELECT id, password_hash FROM users
             WHERE username = $1 OR email = lower($1)
             ORDER BY (username = $1) DESC
             LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserCredentials {
            id: r.get("id"),
            password_hash: r.get("password_hash"),
        }))
    }

    async fn username_exists(&self, username: &str) -> AuthResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create_local_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<UserId> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT username = $1 AS username_taken FROM users
             WHERE username = $1 OR email = $2
             LIMIT 1",
        )
        .bind(username)
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            let field = if row.get::<bool, _>("username_taken") {
                ConflictField::Username
            } else {
                ConflictField::Email
            };
            return Err(AuthError::Conflict(field));
        }

        // A concurrent insert can still win between the check and here
        let user_id: UserId = sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash, auth_type)
             VALUES ($1, $2, $3, 'local')
             RETURNING id",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        tx.commit().await?;

        Ok(user_id)
    }

    async fn find_by_provider(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<UserId>> {
        let user_id = sqlx::query_scalar(
            "SELECT id FROM users WHERE auth_type = $1 AND provider_id = $2",
        )
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }

    async fn link_provider_by_email(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<UserId>> {
        let user_id = sqlx::query_scalar(
            "UPDATE users SET auth_type = $2, provider_id = $3
             WHERE email = $1
             RETURNING id",
        )
        .bind(email)
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?;
        Ok(user_id)
    }

    async fn create_oauth_user(
        &self,
        username: &str,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<UserId> {
        let user_id = sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash, auth_type, provider_id)
             VALUES ($1, $2, NULL, $3, $4)
             RETURNING id",
        )
        .bind(username)
        .bind(email)
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;
        Ok(user_id)
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, auth_type, provider_id, created_at
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }
}

/// Default PostgreSQL implementation of `SessionRepository`
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn replace_user_session(&self, session: &Session) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the owner serialises concurrent logins for the same user
        let owner = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(session.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        if owner.is_none() {
            return Err(AuthError::UserNotFound);
        }

        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(session.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.token)
            .bind(session.user_id)
            .bind(session.expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn find_session(&self, token: &str) -> AuthResult<Option<Session>> {
        let row = sqlx::query("SELECT token, user_id, expires_at FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Session {
            token: r.get("token"),
            user_id: r.get("user_id"),
            expires_at: r.get("expires_at"),
        }))
    }

    async fn delete_session(&self, token: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> AuthResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
