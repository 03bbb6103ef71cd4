//! Prometheus metrics for the identity endpoints.
//!
//! Counters are recorded through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the exporter.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use forum_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::login_attempts_total("password", true);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Increment login attempts counter.
///
/// `method` is `password` or a provider tag.
pub fn login_attempts_total(method: &str, success: bool) {
    metrics::counter!("login_attempts_total",
        "method" => method.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment sessions issued counter.
pub fn sessions_created_total() {
    metrics::counter!("sessions_created_total").increment(1);
}

/// Add rows removed by a GC sweep.
pub fn sessions_swept_total(count: u64) {
    metrics::counter!("sessions_swept_total").increment(count);
}

/// Increment OAuth callback counter.
///
/// `outcome` is `success`, `rejected` (state or verification) or `error`.
pub fn oauth_callbacks_total(provider: &str, outcome: &str) {
    metrics::counter!("oauth_callbacks_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Increment successful registrations counter.
pub fn registrations_total() {
    metrics::counter!("registrations_total").increment(1);
}
