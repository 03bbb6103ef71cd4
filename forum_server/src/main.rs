//! Forum identity server.
//!
//! Serves registration, password and OAuth login, logout and session
//! resolution over HTTP, backed by PostgreSQL or an in-process store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use forum_core::{
    AuthManager,
    db::{Database, MemoryStore, SessionRepository, UserRepository},
    oauth::ProviderRegistry,
};
use forum_server::{
    api::{self, cookies::CookieConfig},
    config::ServerConfig,
    logging, metrics,
};
use pico_args::Arguments;
use tracing::{error, info, warn};

const HELP: &str = "\
Run the forum identity server

USAGE:
  forum_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --in-memory              Use the in-process store instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  SESSION_LIFETIME_HOURS   Session lifetime                  [default: 24]
  SESSION_GC_INTERVAL_SECS Seconds between session sweeps    [default: 3600]
  SESSION_GC_RETENTION_HOURS  Hours kept past expiry         [default: 24]
  COOKIE_SECURE            Mark cookies Secure               [default: true]
  GITHUB_CLIENT_ID, GITHUB_CLIENT_SECRET, GITHUB_REDIRECT_URL
  GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET, GOOGLE_REDIRECT_URL
  OAUTH_STATE_TTL_SECS     OAuth state cookie lifetime       [default: 600]
  METRICS_BIND             Prometheus exporter address (optional)
  RUST_LOG, LOG_FORMAT     Log filter, and `json` for JSON lines
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let in_memory = pargs.contains("--in-memory");
    let bind: Option<SocketAddr> = pargs
        .opt_value_from_str("--bind")
        .context("Invalid --bind address")?;
    let database_url: Option<String> = pargs
        .opt_value_from_str("--db-url")
        .context("Invalid --db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind, database_url, in_memory)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        match metrics::init_metrics(addr) {
            Ok(()) => info!("Prometheus metrics at http://{}/metrics", addr),
            Err(e) => warn!("{}", e),
        }
    }

    let mut database = None;
    let (users, sessions): (Arc<dyn UserRepository>, Arc<dyn SessionRepository>) =
        if config.in_memory {
            warn!("Running on the in-memory store; nothing survives a restart");
            let store = Arc::new(MemoryStore::new());
            let users: Arc<dyn UserRepository> = store.clone();
            let sessions: Arc<dyn SessionRepository> = store;
            (users, sessions)
        } else {
            info!("Connecting to database");
            let db = Database::new(&config.database)
                .await
                .context("Failed to connect to database")?;
            info!("Database connected successfully");
            let repositories = (db.users(), db.sessions());
            database = Some(db);
            repositories
        };

    let providers =
        ProviderRegistry::from_config(&config.oauth).context("Failed to build OAuth client")?;

    let auth_manager = AuthManager::new(users, sessions, providers)
        .with_session_lifetime(chrono::Duration::hours(config.session.lifetime_hours));

    let gc = auth_manager
        .garbage_collector()
        .with_period(std::time::Duration::from_secs(
            config.session.gc_interval_secs,
        ))
        .with_retention(chrono::Duration::hours(config.session.gc_retention_hours))
        .with_sweep_observer(Arc::new(metrics::sessions_swept_total))
        .spawn();

    let state = api::AppState {
        auth_manager: Arc::new(auth_manager),
        cookies: CookieConfig {
            secure: config.session.cookie_secure,
            state_ttl_secs: config.oauth.state_ttl_secs,
        },
    };

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Shutting down server...");
    gc.stop().await;
    if let Some(db) = database {
        db.close().await;
    }

    served.context("Server error")?;

    Ok(())
}

/// Resolves on Ctrl+C. If the handler can't be installed the server runs
/// until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
