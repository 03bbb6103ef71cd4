//! Authentication manager implementation.

use super::{
    credentials::CredentialStore,
    errors::{AuthError, AuthResult},
    gc::SessionGarbageCollector,
    models::{AuthProvider, LoginRequest, RegisterRequest, Session, User, UserId},
    reconciler::IdentityReconciler,
    session::SessionManager,
};
use crate::db::{SessionRepository, UserRepository};
use crate::oauth::{self, ProviderRegistry};
use chrono::Duration;
use std::sync::Arc;

/// Authentication manager
///
/// Wires the credential store, reconciler and session manager over one pair
/// of repositories. Cheap to clone.
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    session_store: Arc<dyn SessionRepository>,
    credentials: CredentialStore,
    reconciler: IdentityReconciler,
    sessions: SessionManager,
    providers: ProviderRegistry,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `users` - User repository
    /// * `session_store` - Session repository
    /// * `providers` - Configured OAuth providers (may be empty)
    pub fn new(
        users: Arc<dyn UserRepository>,
        session_store: Arc<dyn SessionRepository>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            credentials: CredentialStore::new(users.clone()),
            reconciler: IdentityReconciler::new(users.clone()),
            sessions: SessionManager::new(session_store.clone()),
            users,
            session_store,
            providers,
        }
    }

    /// Override the session lifetime (default 24 hours)
    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.sessions = self.sessions.with_lifetime(lifetime);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn reconciler(&self) -> &IdentityReconciler {
        &self.reconciler
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// A collector over the same session store
    pub fn garbage_collector(&self) -> SessionGarbageCollector {
        SessionGarbageCollector::new(self.session_store.clone())
    }

    /// Register a new local user
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidUsername` - Username format invalid
    /// * `AuthError::InvalidEmail` - Email format invalid
    /// * `AuthError::WeakPassword` - Password too weak
    /// * `AuthError::Conflict` - Username or email already exists
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<UserId> {
        self.credentials
            .register_user(&request.username, &request.email, &request.password)
            .await
    }

    /// Login with a username or email and password
    ///
    /// Any session the user already had stops being valid.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - Unknown identifier or wrong password
    pub async fn login(&self, request: LoginRequest) -> AuthResult<Session> {
        let user_id = self
            .credentials
            .verify_credentials(&request.identifier, &request.password)
            .await?;

        self.sessions.create(user_id).await
    }

    /// Logout by deleting the session. Unknown tokens are not an error.
    pub async fn logout(&self, token: &str) -> AuthResult<()> {
        self.sessions.invalidate(token).await
    }

    /// Resolve a session token to its user id
    pub async fn validate_session(&self, token: &str) -> AuthResult<Option<UserId>> {
        self.sessions.validate(token).await
    }

    /// The user behind a session token, if the session is valid
    pub async fn current_user(&self, token: &str) -> AuthResult<Option<User>> {
        match self.sessions.validate(token).await? {
            Some(user_id) => self.users.find_by_id(user_id).await,
            None => Ok(None),
        }
    }

    /// Start an OAuth flow: returns the provider URL and the state nonce to
    /// store in the `oauth_state` cookie.
    ///
    /// # Errors
    ///
    /// * `AuthError::OAuthNotConfigured` - provider has no credentials
    pub fn begin_oauth(&self, provider: AuthProvider) -> AuthResult<(String, String)> {
        let client = self
            .providers
            .get(provider)
            .ok_or(AuthError::OAuthNotConfigured(provider))?;

        let state = oauth::generate_state();
        let url = client.authorization_url(&state)?;

        Ok((url, state))
    }

    /// Finish an OAuth flow and log the user in
    ///
    /// The provider calls complete before any store write, so no lock is
    /// held while waiting on the network.
    ///
    /// # Arguments
    ///
    /// * `provider` - Provider named in the callback route
    /// * `expected_state` - Nonce from the `oauth_state` cookie
    /// * `received_state` - `state` query parameter
    /// * `code` - `code` query parameter
    ///
    /// # Errors
    ///
    /// * `AuthError::OAuthNotConfigured` - provider has no credentials
    /// * `AuthError::OAuthStateMismatch` - state missing or different
    /// * `AuthError::OAuthExchangeFailed` - missing code, or a provider call failed
    /// * `AuthError::EmailNotVerified` - provider didn't vouch for the email
    pub async fn complete_oauth(
        &self,
        provider: AuthProvider,
        expected_state: Option<&str>,
        received_state: Option<&str>,
        code: Option<&str>,
    ) -> AuthResult<Session> {
        let client = self
            .providers
            .get(provider)
            .ok_or(AuthError::OAuthNotConfigured(provider))?;

        oauth::verify_state(expected_state, received_state)?;

        let code = code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::OAuthExchangeFailed("authorization code missing".into()))?;

        let access_token = client.exchange_code(code).await?;
        let identity = client.fetch_identity(&access_token).await?;

        let user_id = self.reconciler.resolve(&identity).await?;

        self.sessions.create(user_id).await
    }

    /// Check the backing store is reachable
    pub async fn health(&self) -> AuthResult<()> {
        self.session_store.ping().await
    }
}
