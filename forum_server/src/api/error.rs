//! Mapping of core errors onto HTTP responses.
//!
//! Validation failures come back as `{"errors": {field: message}}` so a form
//! can show them next to the offending input. Everything else is
//! `{"error": message}` with internal detail withheld.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use forum_core::auth::AuthError;
use serde_json::json;
use std::collections::BTreeMap;

/// Field name to message
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Debug)]
pub enum ApiError {
    /// Error raised by the auth core
    Auth(AuthError),
    /// Form checks done before calling the core
    Fields(FieldErrors),
    /// No valid session on a route that needs one
    Unauthenticated,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Fields(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Auth(err) => match err {
                AuthError::Conflict(_) => StatusCode::CONFLICT,
                AuthError::InvalidCredentials
                | AuthError::SessionNotFound
                | AuthError::SessionExpired => StatusCode::UNAUTHORIZED,
                AuthError::WeakPassword(_)
                | AuthError::InvalidUsername(_)
                | AuthError::InvalidEmail
                | AuthError::EmailNotVerified
                | AuthError::OAuthStateMismatch => StatusCode::BAD_REQUEST,
                AuthError::Storage(_)
                | AuthError::HashingFailed
                | AuthError::TimeOutOfRange(_)
                | AuthError::UserNotFound
                | AuthError::OAuthExchangeFailed(_)
                | AuthError::OAuthNotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            ApiError::Fields(errors) => json!({ "errors": errors }),
            ApiError::Unauthenticated => json!({ "error": "Not authenticated" }),
            ApiError::Auth(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                }

                match err.field() {
                    Some(field) if err.is_validation() => {
                        json!({ "errors": { field: err.client_message() } })
                    }
                    _ => match err {
                        AuthError::OAuthExchangeFailed(_) | AuthError::OAuthNotConfigured(_) => {
                            json!({ "error": err.client_message() })
                        }
                        _ if status.is_server_error() => {
                            json!({ "error": "Internal server error" })
                        }
                        _ => json!({ "error": err.client_message() }),
                    },
                }
            }
        };

        (status, Json(body)).into_response()
    }
}
