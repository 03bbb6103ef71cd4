//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use forum_core::{db::DatabaseConfig, oauth::OAuthConfig};
use std::net::{Ipv4Addr, SocketAddr};

/// Default bind address when neither `--bind` nor `SERVER_BIND` is given
pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
    8080,
);

/// Longest accepted session lifetime and GC retention (ten years)
pub const MAX_SESSION_HOURS: i64 = 24 * 365 * 10;

/// Longest accepted pause between GC sweeps (one week)
pub const MAX_GC_INTERVAL_SECS: u64 = 7 * 24 * 3600;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration; unused when `in_memory` is set
    pub database: DatabaseConfig,
    /// Run on the in-process store instead of PostgreSQL
    pub in_memory: bool,
    /// Session and cookie configuration
    pub session: SessionConfig,
    /// OAuth provider credentials
    pub oauth: OAuthConfig,
    /// Prometheus exporter address, if metrics are wanted
    pub metrics_bind: Option<SocketAddr>,
}

/// Session lifetime, garbage collection and cookie settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session lifetime in hours
    pub lifetime_hours: i64,
    /// Seconds between GC sweeps
    pub gc_interval_secs: u64,
    /// Hours past expiry before GC deletes a row
    pub gc_retention_hours: i64,
    /// Mark cookies `Secure`
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_hours: 24,
            gc_interval_secs: 3600,
            gc_retention_hours: 24,
            cookie_secure: true,
        }
    }
}

impl SessionConfig {
    /// Load from `SESSION_LIFETIME_HOURS`, `SESSION_GC_INTERVAL_SECS`,
    /// `SESSION_GC_RETENTION_HOURS` and `COOKIE_SECURE`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lifetime_hours: parse_env_or("SESSION_LIFETIME_HOURS", defaults.lifetime_hours),
            gc_interval_secs: parse_env_or("SESSION_GC_INTERVAL_SECS", defaults.gc_interval_secs),
            gc_retention_hours: parse_env_or(
                "SESSION_GC_RETENTION_HOURS",
                defaults.gc_retention_hours,
            ),
            cookie_secure: parse_env_or("COOKIE_SECURE", defaults.cookie_secure),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `in_memory` - Use the in-process store (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but can't be used
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        in_memory: bool,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => match std::env::var("SERVER_BIND") {
                Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: format!("'{value}' is not an IP:PORT address"),
                })?,
                Err(_) => DEFAULT_BIND,
            },
        };

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(value) if !value.trim().is_empty() => {
                Some(value.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{value}' is not an IP:PORT address"),
                })?)
            }
            _ => None,
        };

        Ok(ServerConfig {
            bind,
            database,
            in_memory,
            session: SessionConfig::from_env(),
            oauth: OAuthConfig::from_env(),
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SESSION_HOURS).contains(&self.session.lifetime_hours) {
            return Err(ConfigError::Invalid {
                var: "SESSION_LIFETIME_HOURS".to_string(),
                reason: format!("Must be between 1 and {MAX_SESSION_HOURS}"),
            });
        }

        if !(1..=MAX_GC_INTERVAL_SECS).contains(&self.session.gc_interval_secs) {
            return Err(ConfigError::Invalid {
                var: "SESSION_GC_INTERVAL_SECS".to_string(),
                reason: format!("Must be between 1 and {MAX_GC_INTERVAL_SECS}"),
            });
        }

        if !(0..=MAX_SESSION_HOURS).contains(&self.session.gc_retention_hours) {
            return Err(ConfigError::Invalid {
                var: "SESSION_GC_RETENTION_HOURS".to_string(),
                reason: format!("Must be between 0 and {MAX_SESSION_HOURS}"),
            });
        }

        if self.oauth.state_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "OAUTH_STATE_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if !self.in_memory && self.database.database_url.is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Set a PostgreSQL URL or run with --in-memory".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
