//! Google OAuth client.

use super::config::ProviderConfig;
use super::provider::{OAuthProvider, build_authorization_url, get_json, request_token};
use crate::auth::{AuthProvider, AuthResult, ProviderIdentity};
use async_trait::async_trait;
use serde::Deserialize;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPE: &str = "https://www.googleapis.com/auth/userinfo.email \
                     https://www.googleapis.com/auth/userinfo.profile";

/// `userinfo` v2 response
#[derive(Debug, Deserialize)]
pub(crate) struct GoogleUser {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
}

impl From<GoogleUser> for ProviderIdentity {
    fn from(user: GoogleUser) -> Self {
        ProviderIdentity {
            provider: AuthProvider::Google,
            provider_user_id: user.id,
            email: user.email,
            email_verified: user.verified_email,
            display_name: user.name.filter(|name| !name.trim().is_empty()),
        }
    }
}

/// Google provider
pub struct GoogleProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: ProviderConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::Google
    }

    fn authorization_url(&self, state: &str) -> AuthResult<String> {
        build_authorization_url(AUTHORIZE_URL, &self.config, SCOPE, state)
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<String> {
        request_token(&self.client, TOKEN_URL, &self.config, code).await
    }

    async fn fetch_identity(&self, access_token: &str) -> AuthResult<ProviderIdentity> {
        let user: GoogleUser = get_json(&self.client, USERINFO_URL, access_token).await?;
        Ok(user.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_userinfo_is_normalised() {
        let user: GoogleUser = serde_json::from_str(
            r#"{"id":"1098","email":"c@x.com","verified_email":true,"name":"Carol Doe","picture":"p"}"#,
        )
        .unwrap();
        let identity = ProviderIdentity::from(user);
        assert_eq!(identity.provider, AuthProvider::Google);
        assert_eq!(identity.provider_user_id, "1098");
        assert!(identity.email_verified);
        assert_eq!(identity.display_name.as_deref(), Some("Carol Doe"));
    }

    #[test]
    fn test_missing_verification_flag_means_unverified() {
        let user: GoogleUser = serde_json::from_str(r#"{"id":"1","email":"c@x.com"}"#).unwrap();
        let identity = ProviderIdentity::from(user);
        assert!(!identity.email_verified);
        assert_eq!(identity.display_name, None);
    }
}
