//! In-process store implementing both repository traits.
//!
//! All state sits behind one `RwLock`, so every trait method is atomic with
//! respect to every other, matching what the PostgreSQL implementations get
//! from transactions. Used by tests and by the server's `--in-memory` mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::repository::{SessionRepository, UserRepository};
use crate::auth::{
    AuthError, AuthProvider, AuthResult, ConflictField, Session, User, UserCredentials, UserId,
};

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, StoredUser>,
    sessions: HashMap<String, Session>,
    next_id: UserId,
}

impl MemoryState {
    fn find_by_username(&self, username: &str) -> Option<&StoredUser> {
        self.users.values().find(|u| u.user.username == username)
    }

    fn find_by_email(&self, email: &str) -> Option<&StoredUser> {
        self.users.values().find(|u| u.user.email == email)
    }

    fn find_by_provider(&self, provider: AuthProvider, provider_id: &str) -> Option<&StoredUser> {
        self.users.values().find(|u| {
            u.user.auth_type == provider && u.user.provider_id.as_deref() == Some(provider_id)
        })
    }

    /// Same checks the unique constraints make in PostgreSQL
    fn check_unique(
        &self,
        username: &str,
        email: &str,
        provider: Option<(AuthProvider, &str)>,
    ) -> AuthResult<()> {
        if self.find_by_username(username).is_some() {
            return Err(AuthError::Conflict(ConflictField::Username));
        }
        if self.find_by_email(email).is_some() {
            return Err(AuthError::Conflict(ConflictField::Email));
        }
        if let Some((provider, provider_id)) = provider
            && self.find_by_provider(provider, provider_id).is_some()
        {
            return Err(AuthError::Conflict(ConflictField::ProviderIdentity));
        }
        Ok(())
    }

    fn insert_user(
        &mut self,
        username: &str,
        email: &str,
        password_hash: Option<String>,
        auth_type: AuthProvider,
        provider_id: Option<String>,
    ) -> UserId {
        self.next_id += 1;
        let id = self.next_id;
        let user = User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            auth_type,
            provider_id,
            created_at: Utc::now(),
        };
        self.users.insert(id, StoredUser { user, password_hash });
        id
    }
}

/// Memory-backed user and session store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of user rows
    pub async fn user_count(&self) -> usize {
        self.state.read().await.users.len()
    }

    /// Every session row owned by `user_id`, expired or not
    pub async fn sessions_for(&self, user_id: UserId) -> Vec<Session> {
        self.state
            .read()
            .await
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Total number of session rows
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Overwrite a user's stored password hash, e.g. to seed legacy rows
    pub async fn set_password_hash(&self, user_id: UserId, password_hash: Option<String>) {
        if let Some(stored) = self.state.write().await.users.get_mut(&user_id) {
            stored.password_hash = password_hash;
        }
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_credentials(&self, identifier: &str) -> AuthResult<Option<UserCredentials>> {
        let state = self.state.read().await;
        let found = state
            .find_by_username(identifier)
            .or_else(|| state.find_by_email(&identifier.to_lowercase()));

        Ok(found.map(|stored| UserCredentials {
            id: stored.user.id,
            password_hash: stored.password_hash.clone(),
        }))
    }

    async fn username_exists(&self, username: &str) -> AuthResult<bool> {
        Ok(self.state.read().await.find_by_username(username).is_some())
    }

    async fn create_local_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<UserId> {
        let mut state = self.state.write().await;
        state.check_unique(username, email, None)?;
        Ok(state.insert_user(
            username,
            email,
            Some(password_hash.to_string()),
            AuthProvider::Local,
            None,
        ))
    }

    async fn find_by_provider(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<UserId>> {
        let state = self.state.read().await;
        Ok(state
            .find_by_provider(provider, provider_id)
            .map(|stored| stored.user.id))
    }

    async fn link_provider_by_email(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<UserId>> {
        let mut state = self.state.write().await;

        let Some(user_id) = state.find_by_email(email).map(|stored| stored.user.id) else {
            return Ok(None);
        };

        if let Some(owner) = state.find_by_provider(provider, provider_id)
            && owner.user.id != user_id
        {
            return Err(AuthError::Conflict(ConflictField::ProviderIdentity));
        }

        if let Some(stored) = state.users.get_mut(&user_id) {
            stored.user.auth_type = provider;
            stored.user.provider_id = Some(provider_id.to_string());
        }
        Ok(Some(user_id))
    }

    async fn create_oauth_user(
        &self,
        username: &str,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> AuthResult<UserId> {
        let mut state = self.state.write().await;
        state.check_unique(username, email, Some((provider, provider_id)))?;
        Ok(state.insert_user(
            username,
            email,
            None,
            provider,
            Some(provider_id.to_string()),
        ))
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&user_id).map(|stored| stored.user.clone()))
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn replace_user_session(&self, session: &Session) -> AuthResult<()> {
        let mut state = self.state.write().await;

        if !state.users.contains_key(&session.user_id) {
            return Err(AuthError::UserNotFound);
        }

        state.sessions.retain(|_, s| s.user_id != session.user_id);
        state.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, token: &str) -> AuthResult<Option<Session>> {
        Ok(self.state.read().await.sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> AuthResult<()> {
        self.state.write().await.sessions.remove(token);
        Ok(())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.expires_at >= cutoff);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn ping(&self) -> AuthResult<()> {
        Ok(())
    }
}
