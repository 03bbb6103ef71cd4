//! Provider collaborator contract and the pieces GitHub and Google share.

use super::config::ProviderConfig;
use crate::auth::{AuthError, AuthProvider, AuthResult, ProviderIdentity};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

/// One external identity provider.
///
/// `exchange_code` and `fetch_identity` make network calls; callers must not
/// hold any store lock across them.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn kind(&self) -> AuthProvider;

    /// Where to send the browser, carrying `state` back to the callback
    fn authorization_url(&self, state: &str) -> AuthResult<String>;

    /// Trade an authorization code for an access token
    async fn exchange_code(&self, code: &str) -> AuthResult<String>;

    /// Fetch and normalise the profile behind an access token
    async fn fetch_identity(&self, access_token: &str) -> AuthResult<ProviderIdentity>;
}

/// Token endpoint reply. GitHub reports failures with 200 and an `error` field.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_access_token(self) -> AuthResult<String> {
        match (self.access_token, self.error) {
            (Some(token), None) if !token.is_empty() => Ok(token),
            (_, Some(error)) => Err(AuthError::OAuthExchangeFailed(format!(
                "{}: {}",
                error,
                self.error_description.unwrap_or_default()
            ))),
            _ => Err(AuthError::OAuthExchangeFailed(
                "token response without access_token".to_string(),
            )),
        }
    }
}

pub(crate) fn exchange_failed(context: &str, err: impl std::fmt::Display) -> AuthError {
    AuthError::OAuthExchangeFailed(format!("{context}: {err}"))
}

/// Build the authorization redirect for a standard authorization-code flow
pub(crate) fn build_authorization_url(
    base: &str,
    config: &ProviderConfig,
    scope: &str,
    state: &str,
) -> AuthResult<String> {
    let url = Url::parse_with_params(
        base,
        &[
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", scope),
            ("state", state),
        ],
    )
    .map_err(|e| exchange_failed("invalid authorization url", e))?;

    Ok(url.into())
}

/// POST the code to a token endpoint and pull out the access token
pub(crate) async fn request_token(
    client: &reqwest::Client,
    token_url: &str,
    config: &ProviderConfig,
    code: &str,
) -> AuthResult<String> {
    let response = client
        .post(token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", config.redirect_url.as_str()),
        ])
        .send()
        .await
        .map_err(|e| exchange_failed("token request failed", e))?;

    let status = response.status();
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| exchange_failed(&format!("token response ({status}) unreadable"), e))?;

    body.into_access_token()
}

/// GET a JSON document with a bearer token
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    access_token: &str,
) -> AuthResult<T> {
    let response = client
        .get(url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| exchange_failed(url, e))?;

    let response = response
        .error_for_status()
        .map_err(|e| exchange_failed(url, e))?;

    response.json().await.map_err(|e| exchange_failed(url, e))
}
