//! External identity providers.
//!
//! Each provider builds its authorization URL, exchanges the callback code
//! for an access token and turns the provider's profile into a
//! [`ProviderIdentity`](crate::auth::ProviderIdentity). Reconciling that
//! identity with local users is [`IdentityReconciler`](crate::auth::IdentityReconciler)'s job.

pub mod config;
pub mod github;
pub mod google;
pub mod provider;
pub mod state;

pub use config::{OAuthConfig, ProviderConfig};
pub use github::GitHubProvider;
pub use google::GoogleProvider;
pub use provider::OAuthProvider;
pub use state::{generate_state, verify_state};

use crate::auth::AuthProvider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Configured providers, keyed by tag
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<AuthProvider, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the real providers for every configured entry in `config`
    pub fn from_config(config: &OAuthConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("forum/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;

        let mut registry = Self::new();
        if let Some(github) = &config.github {
            registry = registry.with(GitHubProvider::new(github.clone(), client.clone()));
        }
        if let Some(google) = &config.google {
            registry = registry.with(GoogleProvider::new(google.clone(), client));
        }
        Ok(registry)
    }

    /// Add or replace the provider for `provider.kind()`
    pub fn with(mut self, provider: impl OAuthProvider + 'static) -> Self {
        self.providers.insert(provider.kind(), Arc::new(provider));
        self
    }

    pub fn get(&self, provider: AuthProvider) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(&provider).cloned()
    }

    pub fn is_configured(&self, provider: AuthProvider) -> bool {
        self.providers.contains_key(&provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_only_holds_configured_providers() {
        let config = OAuthConfig {
            google: Some(ProviderConfig {
                client_id: "id".into(),
                client_secret: "secret".into(),
                redirect_url: "http://localhost/auth/google/callback".into(),
            }),
            ..OAuthConfig::default()
        };
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.is_configured(AuthProvider::Google));
        assert!(!registry.is_configured(AuthProvider::GitHub));
        assert_eq!(
            registry.get(AuthProvider::Google).map(|p| p.kind()),
            Some(AuthProvider::Google)
        );
    }
}
