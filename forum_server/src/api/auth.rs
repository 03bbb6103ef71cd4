//! Local account handlers: register, login, logout and the current user.
//!
//! # Examples
//!
//! Register:
//! ```bash
//! curl -X POST http://localhost:8080/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"username": "alice", "email": "alice@example.com",
//!        "password": "Abc123!", "confirm_password": "Abc123!"}'
//! ```
//!
//! Login, keeping the session cookie:
//! ```bash
//! curl -c cookies.txt -X POST http://localhost:8080/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"identifier": "alice", "password": "Abc123!"}'
//! ```

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use forum_core::auth::{AuthError, LoginRequest, RegisterRequest, UserId};
use serde::{Deserialize, Serialize};

use super::{
    AppState,
    cookies::{self, SameSite},
    error::{ApiError, FieldErrors},
    middleware::CurrentUser,
    request_id::RequestId,
};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterPayload {
    /// Required fields and the confirmation match, checked before the core runs
    fn check(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();

        if self.username.trim().is_empty() {
            errors.insert("username", "Username is required".to_string());
        }
        if self.email.trim().is_empty() {
            errors.insert("email", "Email is required".to_string());
        }
        if self.password.is_empty() {
            errors.insert("password", "Password is required".to_string());
        } else if self.password != self.confirm_password {
            errors.insert("confirm_password", "Passwords do not match".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Fields(errors))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginPayload {
    /// Username or email
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub provider: String,
}

/// Create a local account.
///
/// Does not log the new user in.
///
/// # Response
///
/// `201 Created` with `{"user_id": 42}`.
///
/// # Errors
///
/// - `400 Bad Request`: missing field, mismatched confirmation, invalid
///   username or email, weak password
/// - `409 Conflict`: username or email taken
/// - `500 Internal Server Error`: storage failure
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.check()?;

    let user_id = state
        .auth_manager
        .register(RegisterRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    metrics::registrations_total();
    tracing::info!(user_id, "User registered");

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

/// Log in with a username or email and a password.
///
/// On success the `session_id` cookie is set and any earlier session of the
/// same user stops working.
///
/// # Errors
///
/// - `400 Bad Request`: identifier or password missing
/// - `401 Unauthorized`: unknown identifier or wrong password
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<LoginPayload>,
) -> Result<Response, ApiError> {
    let mut errors = FieldErrors::new();
    if payload.identifier.trim().is_empty() {
        errors.insert("identifier", "Username or email is required".to_string());
    }
    if payload.password.is_empty() {
        errors.insert("password", "Password is required".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Fields(errors));
    }

    let result = state
        .auth_manager
        .login(LoginRequest {
            identifier: payload.identifier,
            password: payload.password,
        })
        .await;

    let session = match result {
        Ok(session) => session,
        Err(e) => {
            metrics::login_attempts_total("password", false);
            if matches!(e, AuthError::InvalidCredentials) {
                log_security_event(
                    "failed_login",
                    None,
                    Some(request_id.as_str()),
                    "Invalid credentials",
                );
            }
            return Err(e.into());
        }
    };

    metrics::login_attempts_total("password", true);
    metrics::sessions_created_total();

    let cookie = state.cookies.session_cookie(&session, SameSite::Strict);
    let body = LoginResponse {
        user_id: session.user_id,
        expires_at: session.expires_at,
    };

    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Delete the caller's session and clear the cookie.
///
/// Always `204 No Content`, whether or not the session still existed.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = cookies::read_cookie(&headers, cookies::SESSION_COOKIE) {
        state.auth_manager.logout(&token).await?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, state.cookies.clear_session_cookie())],
    )
        .into_response())
}

/// The authenticated user's profile
pub async fn me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<MeResponse>, ApiError> {
    let found = state.auth_manager.current_user(&user.token).await?;

    // Session could have been superseded since the middleware ran
    let found = found.ok_or(ApiError::Unauthenticated)?;

    Ok(Json(MeResponse {
        id: found.id,
        username: found.username,
        email: found.email,
        provider: found.auth_type.to_string(),
    }))
}
