//! HTTP API for the forum's identity and session core.
//!
//! # Modules
//!
//! - [`auth`]: local registration, login, logout and the current user
//! - [`oauth`]: GitHub and Google redirect and callback
//! - [`middleware`]: session cookie resolution and route guards
//! - [`cookies`]: `Set-Cookie` building and `Cookie` parsing
//! - [`error`]: core errors to HTTP responses
//! - [`request_id`]: `x-request-id` tagging
//!
//! # Endpoints
//!
//! ```text
//! GET  /health                    - Store reachability (public)
//! POST /register                  - Create a local account (anonymous only)
//! POST /login                     - Password login, sets session_id (anonymous only)
//! POST /logout                    - Delete the session, clear session_id
//! GET  /me                        - Current user (auth required)
//! GET  /auth/{provider}/login     - Redirect to github or google
//! GET  /auth/{provider}/callback  - Provider callback, sets session_id
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use forum_core::{AuthManager, db::MemoryStore, oauth::ProviderRegistry};
//! use forum_server::api::{AppState, create_router, cookies::CookieConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let auth = AuthManager::new(store.clone(), store, ProviderRegistry::new());
//!
//! let app = create_router(AppState {
//!     auth_manager: Arc::new(auth),
//!     cookies: CookieConfig::default(),
//! });
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod oauth;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chrono::Utc;
use forum_core::AuthManager;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use cookies::CookieConfig;

/// State shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    pub cookies: CookieConfig,
}

/// Build the router with every endpoint and middleware.
///
/// Layers, outermost first: HTTP tracing, request id, session resolution.
/// Route guards sit on the individual routes.
pub fn create_router(state: AppState) -> Router {
    let anonymous_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route_layer(axum::middleware::from_fn(
            middleware::redirect_if_authenticated,
        ));

    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route_layer(axum::middleware::from_fn(middleware::require_auth));

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/logout", post(auth::logout))
        .route("/auth/{provider}/login", get(oauth::login))
        .route("/auth/{provider}/callback", get(oauth::callback));

    Router::new()
        .merge(anonymous_routes)
        .merge(protected_routes)
        .merge(public_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check for monitoring and load balancers.
///
/// `200 OK` when the store answers, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","database":true,"timestamp":"2025-11-22T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = match state.auth_manager.health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            false
        }
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "database": healthy,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}
