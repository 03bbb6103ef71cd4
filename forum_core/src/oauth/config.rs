//! OAuth client credentials.
//!
//! Loaded once at startup and handed to the providers explicitly.

use crate::auth::AuthProvider;
use std::env;

/// Default lifetime of the `oauth_state` cookie
pub const DEFAULT_STATE_TTL_SECS: u64 = 600;

/// Client credentials for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl ProviderConfig {
    /// Read `{PREFIX}_CLIENT_ID`, `{PREFIX}_CLIENT_SECRET` and `{PREFIX}_REDIRECT_URL`.
    ///
    /// Returns `None` unless all three are set and non-empty.
    pub fn from_env(prefix: &str) -> Option<Self> {
        let var = |suffix: &str| {
            env::var(format!("{prefix}_{suffix}"))
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Some(Self {
            client_id: var("CLIENT_ID")?,
            client_secret: var("CLIENT_SECRET")?,
            redirect_url: var("REDIRECT_URL")?,
        })
    }
}

/// Credentials for every supported provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub github: Option<ProviderConfig>,
    pub google: Option<ProviderConfig>,
    pub state_ttl_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            github: None,
            google: None,
            state_ttl_secs: DEFAULT_STATE_TTL_SECS,
        }
    }
}

impl OAuthConfig {
    /// Load from `GITHUB_*`, `GOOGLE_*` and `OAUTH_STATE_TTL_SECS`
    pub fn from_env() -> Self {
        let config = Self {
            github: ProviderConfig::from_env("GITHUB"),
            google: ProviderConfig::from_env("GOOGLE"),
            state_ttl_secs: env::var("OAUTH_STATE_TTL_SECS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_STATE_TTL_SECS),
        };

        for provider in [AuthProvider::GitHub, AuthProvider::Google] {
            if config.provider(provider).is_none() {
                log::warn!("{} OAuth not configured", provider);
            }
        }

        config
    }

    pub fn provider(&self, provider: AuthProvider) -> Option<&ProviderConfig> {
        match provider {
            AuthProvider::GitHub => self.github.as_ref(),
            AuthProvider::Google => self.google.as_ref(),
            AuthProvider::Local => None,
        }
    }
}
