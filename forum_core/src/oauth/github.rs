//! GitHub OAuth app.

use super::config::ProviderConfig;
use super::provider::{OAuthProvider, build_authorization_url, get_json, request_token};
use crate::auth::{AuthProvider, AuthResult, ProviderIdentity};
use async_trait::async_trait;
use serde::Deserialize;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";
const SCOPE: &str = "user:email";

#[derive(Debug, Deserialize)]
pub(crate) struct GitHubUser {
    id: u64,
    login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

/// Normalise `/user` and `/user/emails`.
///
/// The primary address wins if verified, otherwise the first verified one.
/// With no verified address the identity is marked unverified.
pub(crate) fn identity_from_profile(user: GitHubUser, emails: Vec<GitHubEmail>) -> ProviderIdentity {
    let verified = emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified));

    let (email, email_verified) = match verified {
        Some(e) => (e.email.clone(), true),
        None => (
            emails.first().map(|e| e.email.clone()).unwrap_or_default(),
            false,
        ),
    };

    ProviderIdentity {
        provider: AuthProvider::GitHub,
        provider_user_id: user.id.to_string(),
        email,
        email_verified,
        display_name: Some(user.login).filter(|login| !login.is_empty()),
    }
}

/// GitHub provider
pub struct GitHubProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GitHubProvider {
    pub fn new(config: ProviderConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::GitHub
    }

    fn authorization_url(&self, state: &str) -> AuthResult<String> {
        build_authorization_url(AUTHORIZE_URL, &self.config, SCOPE, state)
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<String> {
        request_token(&self.client, TOKEN_URL, &self.config, code).await
    }

    async fn fetch_identity(&self, access_token: &str) -> AuthResult<ProviderIdentity> {
        let user: GitHubUser = get_json(&self.client, USER_URL, access_token).await?;
        let emails: Vec<GitHubEmail> = get_json(&self.client, EMAILS_URL, access_token).await?;
        Ok(identity_from_profile(user, emails))
    }
}
