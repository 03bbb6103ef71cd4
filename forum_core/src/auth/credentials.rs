//! Local username/email/password accounts.

use super::{
    errors::{AuthError, AuthResult},
    models::UserId,
    password,
};
use crate::db::UserRepository;
use std::sync::Arc;

/// Verifies and registers local accounts
#[derive(Clone)]
pub struct CredentialStore {
    users: Arc<dyn UserRepository>,
}

impl CredentialStore {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Check a password against the account named by `identifier`
    ///
    /// # Arguments
    ///
    /// * `identifier` - Username or email
    /// * `password` - Plaintext password
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - unknown account, wrong password, or
    ///   an account without a usable password hash
    pub async fn verify_credentials(&self, identifier: &str, password: &str) -> AuthResult<UserId> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let Some(credentials) = self.users.find_credentials(identifier).await? else {
            // Unknown accounts take as long as wrong passwords
            password::burn_hash(password);
            return Err(AuthError::InvalidCredentials);
        };

        password::verify_password(password, credentials.password_hash.as_deref())?;

        Ok(credentials.id)
    }

    /// Register a new local account
    ///
    /// The email is normalised before it's stored. The password policy is
    /// checked before anything is hashed or written.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidUsername` - Username format invalid
    /// * `AuthError::InvalidEmail` - Email format invalid
    /// * `AuthError::WeakPassword` - Password fails the complexity policy
    /// * `AuthError::Conflict` - Username or email already exists
    pub async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<UserId> {
        let username = username.trim();
        let email = password::normalize_email(email);

        password::validate_username(username)?;
        password::validate_email(&email)?;
        password::validate_password(password)?;

        let password_hash = password::hash_password(password)?;

        let user_id = self
            .users
            .create_local_user(username, &email, &password_hash)
            .await?;

        log::info!("Registered local user {} (id {})", username, user_id);

        Ok(user_id)
    }
}
