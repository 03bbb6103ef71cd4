//! Session issuing, validation and revocation.
//!
//! A user has at most one live session. Creating a session replaces every
//! session the user had, in one store operation, so two concurrent logins
//! for the same user leave exactly one row behind.

use super::{
    errors::{AuthError, AuthResult},
    models::{Session, UserId},
};
use crate::db::SessionRepository;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Default session lifetime
pub const DEFAULT_SESSION_LIFETIME_HOURS: i64 = 24;

/// Token entropy in bytes; hex-encoded this is 64 characters
pub const TOKEN_BYTES: usize = 32;

/// Generate an unguessable, cookie-safe session token
pub fn generate_token() -> String {
    hex::encode(rand::random::<[u8; TOKEN_BYTES]>())
}

/// Session manager
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    lifetime: Duration,
}

impl SessionManager {
    /// Create a session manager with the default 24 hour lifetime
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self {
            sessions,
            lifetime: Duration::hours(DEFAULT_SESSION_LIFETIME_HOURS),
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue a new session for `user_id`, revoking any it already had
    ///
    /// # Errors
    ///
    /// * `AuthError::UserNotFound` - no such user
    /// * `AuthError::Storage` - the replacement was rolled back
    /// * `AuthError::TimeOutOfRange` - the lifetime overflows the expiry timestamp
    pub async fn create(&self, user_id: UserId) -> AuthResult<Session> {
        self.create_at(user_id, Utc::now()).await
    }

    /// [`create`](Self::create) with an explicit clock
    pub async fn create_at(&self, user_id: UserId, now: DateTime<Utc>) -> AuthResult<Session> {
        let expires_at = now.checked_add_signed(self.lifetime).ok_or_else(|| {
            AuthError::TimeOutOfRange(format!("session lifetime {}", self.lifetime))
        })?;

        let session = Session {
            token: generate_token(),
            user_id,
            expires_at,
        };

        self.sessions.replace_user_session(&session).await?;

        log::debug!("Issued session for user {}", user_id);

        Ok(session)
    }

    /// Resolve a token to its user, or `None` if it's unknown or expired.
    ///
    /// Never writes; expired rows are left for the garbage collector.
    pub async fn validate(&self, token: &str) -> AuthResult<Option<UserId>> {
        self.validate_at(token, Utc::now()).await
    }

    /// [`validate`](Self::validate) with an explicit clock
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Option<UserId>> {
        match self.lookup_at(token, now).await {
            Ok(session) => Ok(Some(session.user_id)),
            Err(err) if err.is_unauthenticated() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Like [`validate_at`](Self::validate_at) but says why a token was refused
    ///
    /// # Errors
    ///
    /// * `AuthError::SessionNotFound` - no row for this token
    /// * `AuthError::SessionExpired` - row exists but `expires_at <= now`
    pub async fn lookup_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Session> {
        if token.is_empty() {
            return Err(AuthError::SessionNotFound);
        }

        let session = self
            .sessions
            .find_session(token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.is_expired_at(now) {
            return Err(AuthError::SessionExpired);
        }

        Ok(session)
    }

    /// Delete the session if it exists. Unknown tokens are fine.
    pub async fn invalidate(&self, token: &str) -> AuthResult<()> {
        if token.is_empty() {
            return Ok(());
        }
        self.sessions.delete_session(token).await
    }
}
