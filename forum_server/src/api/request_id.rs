//! Request ids for correlating audit lines.
//!
//! Each request runs inside a `request` span that carries its id, so the
//! security events from [`log_security_event`](crate::logging::log_security_event)
//! and the core's `log` records can be traced back to one HTTP exchange. A
//! client-supplied `x-request-id` is reused only when it is a short token of
//! header-safe characters. Anything else is replaced by a fresh UUID, which
//! keeps attacker-chosen text out of the audit log.

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderMap, HeaderValue, request::Parts},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use tracing::Instrument;
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied id copied into logs
const MAX_REQUEST_ID_LEN: usize = 128;

fn is_loggable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
}

/// Correlation id of the current request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// A fresh v4 UUID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The caller's `x-request-id` if it is loggable, else a fresh one
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| is_loggable(v))
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tag the request with a [`RequestId`] and run it inside a `request` span.
///
/// The id is echoed in the response's `x-request-id` header.
///
/// ```no_run
/// use axum::{Router, routing::get, middleware};
/// use forum_server::api::request_id::request_id_middleware;
///
/// let app: Router = Router::new()
///     .route("/", get(|| async { "Hello" }))
///     .layer(middleware::from_fn(request_id_middleware));
/// ```
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(request.headers());

    // Path only; callback query strings carry OAuth codes
    let span = tracing::info_span!(
        "request",
        request_id = %request_id.as_str(),
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(request_id.clone());

    async move {
        let mut response = next.run(request).await;

        if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        tracing::info!(status = %response.status(), "Request completed");

        response
    }
    .instrument(span)
    .await
}

/// Reads the id set by [`request_id_middleware`].
///
/// Never rejects: a handler mounted without the middleware gets a fresh id so
/// its security events still carry one.
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(RequestId::generate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, routing::get};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn headers_with(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers
    }

    #[test]
    fn test_loggable_client_id_is_kept() {
        let id = RequestId::from_headers(&headers_with("lb-7f3a:0001"));
        assert_eq!(id.as_str(), "lb-7f3a:0001");
    }

    #[test]
    fn test_unloggable_client_ids_are_replaced() {
        let long = "x".repeat(MAX_REQUEST_ID_LEN + 1);
        for bad in ["", "two words", "a\"quote", "SECURITY: forged", long.as_str()] {
            let id = RequestId::from_headers(&headers_with(bad));
            assert!(Uuid::parse_str(id.as_str()).is_ok(), "{bad:?} was kept");
        }

        let missing = RequestId::from_headers(&HeaderMap::new());
        assert!(Uuid::parse_str(missing.as_str()).is_ok());
    }

    #[tokio::test]
    async fn test_extractor_prefers_extension_and_never_rejects() {
        let request = axum::http::Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();

        let fresh = RequestId::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(Uuid::parse_str(fresh.as_str()).is_ok());

        parts.extensions.insert(RequestId("abc".to_string()));
        let id = RequestId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[tokio::test]
    async fn test_middleware_hands_the_same_id_to_handler_and_response() {
        let app = Router::new()
            .route("/", get(|id: RequestId| async move { id.as_str().to_string() }))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let request = axum::http::Request::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "two words")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let echoed = response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        assert_ne!(echoed, "two words");
        assert_eq!(echoed.as_bytes(), &body[..]);
    }
}
