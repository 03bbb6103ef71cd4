//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User ID type
pub type UserId = i64;

/// Where an account's identity comes from.
///
/// Stored in the `auth_type` column as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    GitHub,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::GitHub => "github",
            AuthProvider::Google => "google",
        }
    }

    /// External providers only; `Local` never goes through OAuth.
    pub fn is_external(&self) -> bool {
        !matches!(self, AuthProvider::Local)
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(AuthProvider::Local),
            "github" => Ok(AuthProvider::GitHub),
            "google" => Ok(AuthProvider::Google),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Returned when parsing a provider tag that isn't recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown auth provider: {0}")]
pub struct UnknownProvider(pub String);

/// Which unique column a write collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Username,
    Email,
    ProviderIdentity,
}

impl ConflictField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictField::Username => "username",
            ConflictField::Email => "email",
            ConflictField::ProviderIdentity => "provider",
        }
    }
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictField::Username => f.write_str("Username"),
            ConflictField::Email => f.write_str("Email"),
            ConflictField::ProviderIdentity => f.write_str("Provider identity"),
        }
    }
}

/// User model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub auth_type: AuthProvider,
    pub provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Just what password verification needs
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: UserId,
    /// `None` for accounts created through OAuth
    pub password_hash: Option<String>,
}

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// User login request. `identifier` is a username or an email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// Session model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Expiry is authoritative: a row at or past `expires_at` is dead whether or not it's been swept.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Normalised profile returned by an OAuth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider: AuthProvider,
    pub provider_user_id: String,
    pub email: String,
    pub email_verified: bool,
    /// Login or display name, used as the username hint
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_provider_round_trips_through_str() {
        for provider in [AuthProvider::Local, AuthProvider::GitHub, AuthProvider::Google] {
            assert_eq!(provider.as_str().parse::<AuthProvider>(), Ok(provider));
        }
        assert!("facebook".parse::<AuthProvider>().is_err());
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        let json = serde_json::to_string(&AuthProvider::GitHub).unwrap();
        assert_eq!(json, "\"github\"");
    }

    #[test]
    fn test_session_expiry_boundary() {
        let now = Utc::now();
        let session = Session {
            token: "t".into(),
            user_id: 1,
            expires_at: now,
        };
        assert!(session.is_expired_at(now));
        assert!(!session.is_expired_at(now - Duration::seconds(1)));
    }
}
