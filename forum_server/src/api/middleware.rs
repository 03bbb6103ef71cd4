//! Session resolution and route guards.
//!
//! [`session_middleware`] runs on every request and turns the `session_id`
//! cookie into a [`CurrentUser`] extension. Guards further in read that
//! extension:
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, middleware};
//! # use forum_server::api::middleware::{require_auth, session_middleware};
//! # use forum_server::api::AppState;
//! # async fn handler() {}
//! # let state: AppState = unimplemented!();
//!
//! let app: Router = Router::new()
//!     .route("/me", get(handler).layer(middleware::from_fn(require_auth)))
//!     .layer(middleware::from_fn_with_state(state.clone(), session_middleware))
//!     .with_state(state);
//! # let _ = app;
//! ```

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use forum_core::auth::UserId;

use super::{AppState, cookies, error::ApiError};

/// The authenticated caller, present only when the session cookie is valid
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub token: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}

/// Resolve the `session_id` cookie.
///
/// # Behavior
///
/// - **Valid session**: inserts [`CurrentUser`] and continues
/// - **No cookie**: continues anonymously
/// - **Unknown or expired token**: continues anonymously and clears the cookie
///   on the response
/// - **Storage failure**: `500 Internal Server Error`
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = cookies::read_cookie(request.headers(), cookies::SESSION_COOKIE) else {
        return next.run(request).await;
    };

    match state.auth_manager.validate_session(&token).await {
        Ok(Some(user_id)) => {
            request
                .extensions_mut()
                .insert(CurrentUser { user_id, token });
            next.run(request).await
        }
        Ok(None) => {
            let mut response = next.run(request).await;
            let prefix = format!("{}=", cookies::SESSION_COOKIE);
            let handler_set_session = response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .any(|value| value.as_bytes().starts_with(prefix.as_bytes()));

            // A cookie the handler set wins
            if !handler_set_session
                && let Ok(value) = state.cookies.clear_session_cookie().parse::<HeaderValue>()
            {
                response.headers_mut().append(SET_COOKIE, value);
            }
            response
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Reject anonymous requests with `401 Unauthorized`
pub async fn require_auth(request: Request, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_none() {
        return ApiError::Unauthenticated.into_response();
    }
    next.run(request).await
}

/// Send already logged-in users to `/` with `303 See Other`
pub async fn redirect_if_authenticated(request: Request, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_some() {
        return Redirect::to("/").into_response();
    }
    next.run(request).await
}
