//! `Set-Cookie` construction and `Cookie` header parsing.
//!
//! Two cookies exist: `session_id`, carrying the session token, and
//! `oauth_state`, carrying the nonce between the provider redirect and its
//! callback.

use axum::http::{HeaderMap, header::COOKIE};
use chrono::{DateTime, Utc};
use forum_core::auth::Session;

/// Session token cookie name
pub const SESSION_COOKIE: &str = "session_id";

/// OAuth state nonce cookie name
pub const STATE_COOKIE: &str = "oauth_state";

/// `SameSite` attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    /// Needed when the cookie must survive a cross-site redirect back from a provider
    Lax,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
        }
    }
}

/// Cookie attributes shared by every handler
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Emit the `Secure` attribute
    pub secure: bool,
    /// Lifetime of the `oauth_state` cookie
    pub state_ttl_secs: u64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: true,
            state_ttl_secs: forum_core::oauth::config::DEFAULT_STATE_TTL_SECS,
        }
    }
}

impl CookieConfig {
    /// Cookie carrying `session`, expiring with the session row
    pub fn session_cookie(&self, session: &Session, same_site: SameSite) -> String {
        self.session_cookie_at(session, same_site, Utc::now())
    }

    pub fn session_cookie_at(
        &self,
        session: &Session,
        same_site: SameSite,
        now: DateTime<Utc>,
    ) -> String {
        let max_age = (session.expires_at - now).num_seconds().max(0);
        self.build(
            SESSION_COOKIE,
            &session.token,
            same_site,
            max_age,
            session.expires_at,
        )
    }

    /// Expired `session_id`, telling the browser to drop it
    pub fn clear_session_cookie(&self) -> String {
        self.build(SESSION_COOKIE, "", SameSite::Strict, 0, DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Short-lived cookie holding the state nonce
    pub fn state_cookie(&self, state: &str) -> String {
        let ttl = i64::try_from(self.state_ttl_secs).unwrap_or(i64::MAX);
        let expires = chrono::Duration::try_seconds(ttl)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.build(STATE_COOKIE, state, SameSite::Lax, ttl, expires)
    }

    pub fn clear_state_cookie(&self) -> String {
        self.build(STATE_COOKIE, "", SameSite::Lax, 0, DateTime::<Utc>::UNIX_EPOCH)
    }

    fn build(
        &self,
        name: &str,
        value: &str,
        same_site: SameSite,
        max_age: i64,
        expires: DateTime<Utc>,
    ) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}; Expires={}",
            name,
            value,
            same_site.as_str(),
            max_age,
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Value of cookie `name` from the request's `Cookie` headers
///
/// Empty values count as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::{Duration, TimeZone};

    fn session(expires_at: DateTime<Utc>) -> Session {
        Session {
            token: "abc123".to_string(),
            user_id: 1,
            expires_at,
        }
    }

    #[test]
    fn test_session_cookie_attributes() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let config = CookieConfig::default();

        let cookie =
            config.session_cookie_at(&session(now + Duration::hours(24)), SameSite::Strict, now);

        assert!(cookie.starts_with("session_id=abc123; Path=/; HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(cookie.contains("Expires=Sat, 02 Mar 2024 12:00:00 GMT"));
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn test_insecure_and_lax() {
        let config = CookieConfig {
            secure: false,
            state_ttl_secs: 60,
        };
        let now = Utc::now();

        let cookie = config.session_cookie_at(&session(now), SameSite::Lax, now);
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));

        let state = config.state_cookie("nonce");
        assert!(state.starts_with("oauth_state=nonce;"));
        assert!(state.contains("Max-Age=60"));
        assert!(state.contains("HttpOnly"));
    }

    #[test]
    fn test_clear_cookies_expire_immediately() {
        let config = CookieConfig::default();

        let cleared = config.clear_session_cookie();
        assert!(cleared.starts_with("session_id=;"));
        assert!(cleared.contains("Max-Age=0"));
        assert!(cleared.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));

        assert!(config.clear_state_cookie().starts_with("oauth_state=;"));
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; session_id=tok; oauth_state="),
        );

        assert_eq!(read_cookie(&headers, "session_id").as_deref(), Some("tok"));
        assert_eq!(read_cookie(&headers, "theme").as_deref(), Some("dark"));
        assert_eq!(read_cookie(&headers, "oauth_state"), None);
        assert_eq!(read_cookie(&headers, "missing"), None);
        assert_eq!(read_cookie(&HeaderMap::new(), "session_id"), None);
    }
}
