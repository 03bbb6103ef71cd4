//! # Forum Core
//!
//! Identity and session management for the forum backend.
//!
//! The hard part of the forum is not rendering posts but knowing who is
//! asking. This crate owns that:
//!
//! - **CredentialStore**: local username/email/password accounts
//! - **UsernameAllocator**: collision-free usernames with a bounded retry
//! - **IdentityReconciler**: maps GitHub/Google identities to local users
//! - **SessionManager**: issues, validates and revokes session tokens, one live session per user
//! - **SessionGarbageCollector**: background removal of long-expired sessions
//!
//! ## Core Modules
//!
//! - [`auth`]: the components above and the [`AuthManager`] facade
//! - [`db`]: repository traits with PostgreSQL and in-memory implementations
//! - [`oauth`]: provider clients and state nonces
//!
//! ## Example
//!
//! ```
//! use forum_core::{AuthManager, db::MemoryStore, oauth::ProviderRegistry};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let auth = AuthManager::new(store.clone(), store, ProviderRegistry::new());
//! ```

/// Accounts, identity reconciliation and sessions.
pub mod auth;
pub use auth::{AuthError, AuthManager, AuthProvider, AuthResult, Session, User, UserId};

/// Storage contract and implementations.
pub mod db;

/// OAuth provider collaborators.
pub mod oauth;
