//! Mapping external OAuth identities onto local user records.
//!
//! Resolution order, first match wins:
//!
//! 1. the user already linked to `(provider, provider_user_id)`
//! 2. the user owning the (verified) email, which gets the provider linked
//! 3. a new user with an allocated username and no password
//!
//! Nothing is written unless the provider vouched for the email.

use super::{
    errors::{AuthError, AuthResult},
    models::{ConflictField, ProviderIdentity, UserId},
    password,
    username::{UsernameAllocator, short_suffix},
};
use crate::db::UserRepository;
use std::sync::Arc;

/// Resolution passes before a unique-constraint race is reported to the caller
pub const MAX_RESOLVE_ATTEMPTS: usize = 3;

/// Resolves provider identities to user ids
#[derive(Clone)]
pub struct IdentityReconciler {
    users: Arc<dyn UserRepository>,
    allocator: UsernameAllocator,
}

impl IdentityReconciler {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        let allocator = UsernameAllocator::new(users.clone());
        Self { users, allocator }
    }

    /// Find, link or create the local user for `identity`.
    ///
    /// Calling this twice with the same provider identity returns the same
    /// id, even if the email changed upstream in between.
    ///
    /// # Errors
    ///
    /// * `AuthError::EmailNotVerified` - provider didn't verify the email; nothing was written
    /// * `AuthError::InvalidEmail` - provider sent something that isn't an address
    /// * `AuthError::OAuthExchangeFailed` - identity is missing its provider user id
    /// * `AuthError::Conflict` - concurrent writers kept winning for every attempt
    /// * `AuthError::Storage` - store failure
    pub async fn resolve(&self, identity: &ProviderIdentity) -> AuthResult<UserId> {
        if !identity.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        if !identity.provider.is_external() || identity.provider_user_id.is_empty() {
            return Err(AuthError::OAuthExchangeFailed(format!(
                "incomplete {} identity",
                identity.provider
            )));
        }

        let email = password::normalize_email(&identity.email);
        password::validate_email(&email)?;

        let mut last_conflict = ConflictField::ProviderIdentity;

        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            match self.resolve_once(identity, &email).await {
                Err(AuthError::Conflict(field)) => {
                    log::debug!(
                        "Lost {} race resolving {} identity (attempt {}/{})",
                        field.as_str(),
                        identity.provider,
                        attempt,
                        MAX_RESOLVE_ATTEMPTS
                    );
                    last_conflict = field;
                }
                result => return result,
            }
        }

        Err(AuthError::Conflict(last_conflict))
    }

    async fn resolve_once(&self, identity: &ProviderIdentity, email: &str) -> AuthResult<UserId> {
        let provider = identity.provider;
        let provider_id = identity.provider_user_id.as_str();

        if let Some(user_id) = self.users.find_by_provider(provider, provider_id).await? {
            return Ok(user_id);
        }

        if let Some(user_id) = self
            .users
            .link_provider_by_email(email, provider, provider_id)
            .await?
        {
            log::info!("Linked {} identity to existing user {}", provider, user_id);
            return Ok(user_id);
        }

        let base = identity
            .display_name
            .as_deref()
            .and_then(password::sanitize_username_hint)
            .unwrap_or_else(|| format!("{}_user_{}", provider, short_suffix()));
        let username = self.allocator.generate_unique(&base).await?;

        let user_id = self
            .users
            .create_oauth_user(&username, email, provider, provider_id)
            .await?;

        log::info!(
            "Created user {} (id {}) from {} identity",
            username,
            user_id,
            provider
        );

        Ok(user_id)
    }
}
