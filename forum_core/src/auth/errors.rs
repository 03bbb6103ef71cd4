//! Authentication error types.

use super::models::{AuthProvider, ConflictField};
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Unknown identifier, wrong password, or an account without a usable password
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Password does not satisfy the complexity policy
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// Username, email or provider identity already taken
    #[error("{0} already exists")]
    Conflict(ConflictField),

    /// Invalid username format
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Invalid email format
    #[error("Invalid email address")]
    InvalidEmail,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Provider reported the email as unverified
    #[error("Email not verified with provider")]
    EmailNotVerified,

    /// OAuth `state` did not match the nonce issued at redirect time
    #[error("Invalid OAuth state")]
    OAuthStateMismatch,

    /// Code exchange or profile fetch failed
    #[error("OAuth exchange failed: {0}")]
    OAuthExchangeFailed(String),

    /// Provider credentials missing from configuration
    #[error("{0} OAuth not configured")]
    OAuthNotConfigured(AuthProvider),

    /// Session not found
    #[error("Session not found")]
    SessionNotFound,

    /// Session expired
    #[error("Session expired")]
    SessionExpired,

    /// A configured lifetime or retention pushed a timestamp past chrono's range
    #[error("Timestamp out of range: {0}")]
    TimeOutOfRange(String),
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Storage and provider errors are sanitized to prevent information disclosure
    /// about the internal system structure or the provider's responses.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Storage(_) | AuthError::HashingFailed | AuthError::TimeOutOfRange(_) => {
                "Internal server error".to_string()
            }
            AuthError::OAuthExchangeFailed(_) | AuthError::OAuthNotConfigured(_) => {
                "Authentication failed".to_string()
            }
            AuthError::SessionNotFound | AuthError::SessionExpired => {
                "Not authenticated".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Form field a validation error belongs to, if any
    pub fn field(&self) -> Option<&'static str> {
        match self {
            AuthError::WeakPassword(_) | AuthError::InvalidCredentials => Some("password"),
            AuthError::InvalidUsername(_) => Some("username"),
            AuthError::InvalidEmail => Some("email"),
            AuthError::Conflict(field) => Some(field.as_str()),
            _ => None,
        }
    }

    /// Expected, user-facing failures that are reported back rather than logged as faults
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::WeakPassword(_)
                | AuthError::Conflict(_)
                | AuthError::InvalidUsername(_)
                | AuthError::InvalidEmail
        )
    }

    /// Both session errors mean the caller is anonymous
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AuthError::SessionNotFound | AuthError::SessionExpired)
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
