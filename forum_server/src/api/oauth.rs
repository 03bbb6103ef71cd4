//! OAuth redirect and callback handlers.
//!
//! `GET /auth/{provider}/login` stores a state nonce in a cookie and sends the
//! browser to the provider. `GET /auth/{provider}/callback` checks the nonce,
//! lets the core exchange the code and reconcile the identity, then sets the
//! session cookie with `SameSite=Lax` so it survives the cross-site hop.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use forum_core::auth::{AuthError, AuthProvider};
use serde::Deserialize;

use super::{
    AppState,
    cookies::{self, SameSite},
    error::ApiError,
    request_id::RequestId,
};
use crate::{logging::log_security_event, metrics};

/// Where a successful login lands
pub const LOGIN_SUCCESS_REDIRECT: &str = "/?login_success=true";

/// Where a rejected flow lands, without detail
pub const LOGIN_FAILED_REDIRECT: &str = "/login?error=oauth";

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declined
    pub error: Option<String>,
}

/// External provider named by the path, or `None` for anything else
fn external_provider(name: &str) -> Option<AuthProvider> {
    name.parse::<AuthProvider>()
        .ok()
        .filter(AuthProvider::is_external)
}

/// Redirect to the provider's consent page (`307 Temporary Redirect`)
pub async fn login(State(state): State<AppState>, Path(provider): Path<String>) -> Response {
    let Some(provider) = external_provider(&provider) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match state.auth_manager.begin_oauth(provider) {
        Ok((url, nonce)) => (
            [(SET_COOKIE, state.cookies.state_cookie(&nonce))],
            Redirect::temporary(&url),
        )
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Finish the flow started by [`login`].
///
/// # Behavior
///
/// - **Success**: `303` to `/?login_success=true` with the session cookie
/// - **State mismatch, unverified or malformed email, user declined, or an
///   identity still contested after retries**: `303` to `/login?error=oauth`
/// - **Provider or storage failure**: `500` with a generic message
///
/// The state cookie is cleared in every case.
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    request_id: RequestId,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(provider) = external_provider(&provider) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let clear_state = (SET_COOKIE, state.cookies.clear_state_cookie());

    if let Some(error) = &params.error {
        tracing::info!(provider = %provider, error = %error, "OAuth consent not granted");
        metrics::oauth_callbacks_total(provider.as_str(), "rejected");
        return (AppendHeaders([clear_state]), Redirect::to(LOGIN_FAILED_REDIRECT)).into_response();
    }

    let expected = cookies::read_cookie(&headers, cookies::STATE_COOKIE);

    let result = state
        .auth_manager
        .complete_oauth(
            provider,
            expected.as_deref(),
            params.state.as_deref(),
            params.code.as_deref(),
        )
        .await;

    match result {
        Ok(session) => {
            metrics::oauth_callbacks_total(provider.as_str(), "success");
            metrics::login_attempts_total(provider.as_str(), true);
            metrics::sessions_created_total();
            tracing::info!(provider = %provider, user_id = session.user_id, "OAuth login");

            let session_cookie = (
                SET_COOKIE,
                state.cookies.session_cookie(&session, SameSite::Lax),
            );
            (
                AppendHeaders([clear_state, session_cookie]),
                Redirect::to(LOGIN_SUCCESS_REDIRECT),
            )
                .into_response()
        }
        Err(
            e @ (AuthError::OAuthStateMismatch
            | AuthError::EmailNotVerified
            | AuthError::InvalidEmail
            | AuthError::Conflict(_)),
        ) => {
            let event = match e {
                AuthError::OAuthStateMismatch => "oauth_state_mismatch",
                AuthError::EmailNotVerified => "oauth_unverified_email",
                AuthError::InvalidEmail => "oauth_invalid_email",
                _ => "oauth_identity_conflict",
            };
            log_security_event(
                event,
                None,
                Some(request_id.as_str()),
                &format!("{} callback rejected: {}", provider, e),
            );
            metrics::oauth_callbacks_total(provider.as_str(), "rejected");
            metrics::login_attempts_total(provider.as_str(), false);

            (AppendHeaders([clear_state]), Redirect::to(LOGIN_FAILED_REDIRECT)).into_response()
        }
        Err(e) => {
            metrics::oauth_callbacks_total(provider.as_str(), "error");
            metrics::login_attempts_total(provider.as_str(), false);

            (AppendHeaders([clear_state]), ApiError::from(e)).into_response()
        }
    }
}
