//! Integration tests for the HTTP surface.
//!
//! Drives the router in-process with `oneshot`, on the in-memory store and a
//! fake OAuth provider.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use forum_core::AuthManager;
use forum_core::auth::{
    AuthError, AuthProvider, AuthResult, ConflictField, ProviderIdentity, User, UserCredentials,
    UserId,
};
use forum_core::db::{MemoryStore, UserRepository};
use forum_core::oauth::{OAuthProvider, ProviderRegistry};
use forum_server::api::{AppState, cookies::CookieConfig, create_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

/// Accepts the code `good` and always returns the same profile
struct FakeProvider {
    identity: ProviderIdentity,
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    fn kind(&self) -> AuthProvider {
        self.identity.provider
    }

    fn authorization_url(&self, state: &str) -> AuthResult<String> {
        Ok(format!("https://provider.test/authorize?state={state}"))
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<String> {
        if code == "good" {
            Ok("access-token".to_string())
        } else {
            Err(AuthError::OAuthExchangeFailed("bad_verification_code".into()))
        }
    }

    async fn fetch_identity(&self, _access_token: &str) -> AuthResult<ProviderIdentity> {
        Ok(self.identity.clone())
    }
}

fn github_identity(email_verified: bool) -> ProviderIdentity {
    ProviderIdentity {
        provider: AuthProvider::GitHub,
        provider_user_id: "4242".to_string(),
        email: "octo@example.com".to_string(),
        email_verified,
        display_name: Some("octocat".to_string()),
    }
}

fn create_test_server(providers: ProviderRegistry) -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let shared = Arc::new(store.clone());
    let auth_manager = AuthManager::new(shared.clone(), shared, providers);

    let app = create_router(AppState {
        auth_manager: Arc::new(auth_manager),
        cookies: CookieConfig::default(),
    });

    (app, store)
}

fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Full `Set-Cookie` line for cookie `name`
fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .map(str::to_string)
}

/// `name=value` pair to send back, taken from a `Set-Cookie` line
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(app: &Router, username: &str, email: &str) -> Response<Body> {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/register",
            json!({
                "username": username,
                "email": email,
                "password": "Abc123!",
                "confirm_password": "Abc123!",
            }),
            None,
        ))
        .await
        .unwrap()
}

/// Log in and return the `session_id=...` pair
async fn login(app: &Router, identifier: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({ "identifier": identifier, "password": "Abc123!" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    cookie_pair(&set_cookie(&response, "session_id").unwrap())
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, _) = create_test_server(ProviderRegistry::new());

    let response = app.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

// ============================================================================
// Registration and Login Tests
// ============================================================================

#[tokio::test]
async fn test_register_then_duplicate() {
    let (app, store) = create_test_server(ProviderRegistry::new());

    let response = register(&app, "alice", "alice@example.com").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["user_id"].as_i64().is_some());

    let response = register(&app, "alice", "other@example.com").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["errors"]["username"], "Username already exists");

    let response = register(&app, "alice2", "ALICE@example.com").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["errors"]["email"], "Email already exists");

    assert_eq!(store.user_count().await, 1);
}

#[tokio::test]
async fn test_register_form_errors() {
    let (app, store) = create_test_server(ProviderRegistry::new());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/register",
            json!({
                "username": "bob",
                "email": "bob@example.com",
                "password": "Abc123!",
                "confirm_password": "nope",
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errors"]["confirm_password"], "Passwords do not match");

    let response = app
        .oneshot(json_request(
            "POST",
            "/register",
            json!({
                "username": "bob",
                "email": "bob@example.com",
                "password": "weak",
                "confirm_password": "weak",
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["errors"]["password"].is_string());

    assert_eq!(store.user_count().await, 0);
}

#[tokio::test]
async fn test_login_sets_strict_cookie_and_me_works() {
    let (app, _) = create_test_server(ProviderRegistry::new());
    register(&app, "alice", "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({ "identifier": "alice@example.com", "password": "Abc123!" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = set_cookie(&response, "session_id").unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/"));

    let response = app
        .oneshot(get("/me", Some(&cookie_pair(&cookie))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["provider"], "local");
}

#[tokio::test]
async fn test_wrong_password_is_401() {
    let (app, _) = create_test_server(ProviderRegistry::new());
    register(&app, "alice", "alice@example.com").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/login",
            json!({ "identifier": "alice", "password": "Wrong123!" }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&response, "session_id").is_none());
    let body = body_json(response).await;
    assert_eq!(body["errors"]["password"], "Invalid username or password");
}

#[tokio::test]
async fn test_me_requires_session() {
    let (app, _) = create_test_server(ProviderRegistry::new());

    let response = app.oneshot(get("/me", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_second_login_supersedes_first_cookie() {
    let (app, _) = create_test_server(ProviderRegistry::new());
    register(&app, "alice", "alice@example.com").await;

    let first = login(&app, "alice").await;
    let second = login(&app, "alice").await;
    assert_ne!(first, second);

    let response = app.clone().oneshot(get("/me", Some(&first))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cleared = set_cookie(&response, "session_id").unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = app.oneshot(get("/me", Some(&second))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logged_in_user_is_redirected_from_login() {
    let (app, _) = create_test_server(ProviderRegistry::new());
    register(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/login",
            json!({ "identifier": "alice", "password": "Abc123!" }),
            Some(&session),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

// ============================================================================
// Logout Tests
// ============================================================================

#[tokio::test]
async fn test_logout_clears_cookie_and_session() {
    let (app, store) = create_test_server(ProviderRegistry::new());
    register(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/logout", json!({}), Some(&session)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = set_cookie(&response, "session_id").unwrap();
    assert!(cleared.starts_with("session_id=;"));
    assert_eq!(store.session_count().await, 0);

    let response = app.oneshot(get("/me", Some(&session))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_session_still_clears_cookie() {
    let (app, _) = create_test_server(ProviderRegistry::new());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/logout", json!({}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(set_cookie(&response, "session_id").is_some());

    let response = app
        .oneshot(json_request(
            "POST",
            "/logout",
            json!({}),
            Some("session_id=deadbeef"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
    assert_eq!(cookies.len(), 1, "Middleware must not add a second clear");
}

// ============================================================================
// OAuth Tests
// ============================================================================

/// Start the flow and return the nonce from the state cookie
async fn begin_github(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(get("/auth/github/login", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let state_cookie = set_cookie(&response, "oauth_state").unwrap();
    assert!(state_cookie.contains("HttpOnly"));
    let nonce = cookie_pair(&state_cookie)
        .trim_start_matches("oauth_state=")
        .to_string();

    assert_eq!(
        location(&response),
        format!("https://provider.test/authorize?state={nonce}")
    );
    nonce
}

fn callback(code: &str, state: &str, cookie_state: &str) -> Request<Body> {
    get(
        &format!("/auth/github/callback?code={code}&state={state}"),
        Some(&format!("oauth_state={cookie_state}")),
    )
}

#[tokio::test]
async fn test_oauth_round_trip_creates_user_and_session() {
    let providers = ProviderRegistry::new().with(FakeProvider {
        identity: github_identity(true),
    });
    let (app, store) = create_test_server(providers);

    let nonce = begin_github(&app).await;
    let response = app
        .clone()
        .oneshot(callback("good", &nonce, &nonce))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?login_success=true");
    assert!(set_cookie(&response, "oauth_state").unwrap().contains("Max-Age=0"));
    let session = set_cookie(&response, "session_id").unwrap();
    assert!(session.contains("SameSite=Lax"));

    let response = app
        .oneshot(get("/me", Some(&cookie_pair(&session))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "octocat");
    assert_eq!(body["provider"], "github");
    assert_eq!(store.user_count().await, 1);
}

#[tokio::test]
async fn test_oauth_state_mismatch_redirects_without_writes() {
    let providers = ProviderRegistry::new().with(FakeProvider {
        identity: github_identity(true),
    });
    let (app, store) = create_test_server(providers);

    let nonce = begin_github(&app).await;
    let response = app
        .clone()
        .oneshot(callback("good", "forged", &nonce))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?error=oauth");
    assert!(set_cookie(&response, "session_id").is_none());
    assert_eq!(store.user_count().await, 0);

    // No state cookie at all
    let response = app
        .oneshot(get(
            &format!("/auth/github/callback?code=good&state={nonce}"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "/login?error=oauth");
    assert_eq!(store.user_count().await, 0);
}

#[tokio::test]
async fn test_oauth_unverified_email_redirects_without_writes() {
    let providers = ProviderRegistry::new().with(FakeProvider {
        identity: github_identity(false),
    });
    let (app, store) = create_test_server(providers);

    let nonce = begin_github(&app).await;
    let response = app.oneshot(callback("good", &nonce, &nonce)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?error=oauth");
    assert_eq!(store.user_count().await, 0);
    assert_eq!(store.session_count().await, 0);
}

#[tokio::test]
async fn test_oauth_malformed_provider_email_redirects_without_writes() {
    let mut identity = github_identity(true);
    identity.email = "not-an-email".to_string();
    let providers = ProviderRegistry::new().with(FakeProvider { identity });
    let (app, store) = create_test_server(providers);

    let nonce = begin_github(&app).await;
    let response = app.oneshot(callback("good", &nonce, &nonce)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?error=oauth");
    assert!(set_cookie(&response, "oauth_state").unwrap().contains("Max-Age=0"));
    assert_eq!(store.user_count().await, 0);
}

/// Memory store on which every OAuth account insert loses a race
struct ContestedUsers {
    inner: MemoryStore,
}

#[async_trait]
impl UserRepository for ContestedUsers {
    async fn find_credentials(&self, identifier: &str) -> AuthResult<Option<UserCredentials>> {
        self.inner.find_credentials(identifier).await
    }
    async fn username_exists(&self, username: &str) -> AuthResult<bool> {
        self.inner.username_exists(username).await
    }
    async fn create_local_user(
        &self,
        username: &str,
        email: &str,
        hash: &str,
    ) -> AuthResult<UserId> {
        self.inner.create_local_user(username, email, hash).await
    }
    async fn find_by_provider(
        &self,
        provider: AuthProvider,
        id: &str,
    ) -> AuthResult<Option<UserId>> {
        self.inner.find_by_provider(provider, id).await
    }
    async fn link_provider_by_email(
        &self,
        email: &str,
        provider: AuthProvider,
        id: &str,
    ) -> AuthResult<Option<UserId>> {
        self.inner.link_provider_by_email(email, provider, id).await
    }
    async fn create_oauth_user(
        &self,
        _: &str,
        _: &str,
        _: AuthProvider,
        _: &str,
    ) -> AuthResult<UserId> {
        Err(AuthError::Conflict(ConflictField::ProviderIdentity))
    }
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        self.inner.find_by_id(user_id).await
    }
}

#[tokio::test]
async fn test_oauth_conflict_after_retries_redirects() {
    let store = MemoryStore::new();
    let providers = ProviderRegistry::new().with(FakeProvider {
        identity: github_identity(true),
    });
    let auth_manager = AuthManager::new(
        Arc::new(ContestedUsers {
            inner: store.clone(),
        }),
        Arc::new(store.clone()),
        providers,
    );
    let app = create_router(AppState {
        auth_manager: Arc::new(auth_manager),
        cookies: CookieConfig::default(),
    });

    let nonce = begin_github(&app).await;
    let response = app.oneshot(callback("good", &nonce, &nonce)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?error=oauth");
    assert!(set_cookie(&response, "session_id").is_none());
    assert_eq!(store.session_count().await, 0);
}

#[tokio::test]
async fn test_oauth_exchange_failure_is_generic_500() {
    let providers = ProviderRegistry::new().with(FakeProvider {
        identity: github_identity(true),
    });
    let (app, _) = create_test_server(providers);

    let nonce = begin_github(&app).await;
    let response = app
        .clone()
        .oneshot(callback("bad", &nonce, &nonce))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(set_cookie(&response, "oauth_state").is_some());
    let body = body_json(response).await;
    assert_eq!(body["error"], "Authentication failed");
    assert!(!body.to_string().contains("bad_verification_code"));

    // Missing code
    let response = app
        .oneshot(get(
            &format!("/auth/github/callback?state={nonce}"),
            Some(&format!("oauth_state={nonce}")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_oauth_declined_consent_redirects() {
    let providers = ProviderRegistry::new().with(FakeProvider {
        identity: github_identity(true),
    });
    let (app, store) = create_test_server(providers);

    let response = app
        .oneshot(get("/auth/github/callback?error=access_denied", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?error=oauth");
    assert_eq!(store.user_count().await, 0);
}

#[tokio::test]
async fn test_oauth_unconfigured_and_unknown_providers() {
    let (app, _) = create_test_server(ProviderRegistry::new());

    let response = app
        .clone()
        .oneshot(get("/auth/google/login", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Authentication failed");

    let response = app
        .clone()
        .oneshot(get("/auth/gitlab/login", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/auth/local/login", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oauth_links_existing_local_account() {
    let providers = ProviderRegistry::new().with(FakeProvider {
        identity: github_identity(true),
    });
    let (app, store) = create_test_server(providers);
    register(&app, "octo", "octo@example.com").await;

    let nonce = begin_github(&app).await;
    let response = app
        .clone()
        .oneshot(callback("good", &nonce, &nonce))
        .await
        .unwrap();
    let session = cookie_pair(&set_cookie(&response, "session_id").unwrap());

    let response = app.oneshot(get("/me", Some(&session))).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["username"], "octo");
    assert_eq!(store.user_count().await, 1);
}
