//! Authentication module providing local accounts, OAuth identity
//! reconciliation and single-session management.
//!
//! This module implements:
//! - Argon2id password hashing behind a complexity policy
//! - Login by username or email
//! - Linking GitHub/Google identities to local users by verified email
//! - At most one live session per user, replaced atomically on every login
//! - A background sweep of expired session rows
//!
//! ## Example
//!
//! ```no_run
//! use forum_core::auth::{AuthManager, LoginRequest, RegisterRequest};
//! use forum_core::db::{Database, DatabaseConfig};
//! use forum_core::oauth::ProviderRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::from_env()).await?;
//!     let auth = AuthManager::new(db.users(), db.sessions(), ProviderRegistry::new());
//!
//!     auth.register(RegisterRequest {
//!         username: "alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!         password: "Abc123!".to_string(),
//!     })
//!     .await?;
//!
//!     let session = auth
//!         .login(LoginRequest {
//!             identifier: "alice".to_string(),
//!             password: "Abc123!".to_string(),
//!         })
//!         .await?;
//!     println!("Session expires at {}", session.expires_at);
//!     Ok(())
//! }
//! ```

pub mod credentials;
pub mod errors;
pub mod gc;
pub mod manager;
pub mod models;
pub mod password;
pub mod reconciler;
pub mod session;
pub mod username;

pub use credentials::CredentialStore;
pub use errors::{AuthError, AuthResult};
pub use gc::{GcHandle, SessionGarbageCollector, SweepObserver};
pub use manager::AuthManager;
pub use models::{
    AuthProvider, ConflictField, LoginRequest, ProviderIdentity, RegisterRequest, Session, User,
    UserCredentials, UserId,
};
pub use reconciler::IdentityReconciler;
pub use session::SessionManager;
pub use username::UsernameAllocator;
