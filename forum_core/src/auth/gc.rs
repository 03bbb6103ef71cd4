//! Background sweep of expired session rows.
//!
//! This only reclaims space. Expiry itself is enforced by
//! [`SessionManager::validate`](super::SessionManager::validate), whether or not a
//! sweep has run.

use super::errors::{AuthError, AuthResult};
use crate::db::SessionRepository;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Default sweep period
pub const DEFAULT_SWEEP_PERIOD_SECS: u64 = 3600;

/// Default grace period past expiry before a row is deleted
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Callback told how many rows each successful sweep removed
pub type SweepObserver = Arc<dyn Fn(u64) + Send + Sync>;

/// Periodic deleter of expired sessions
#[derive(Clone)]
pub struct SessionGarbageCollector {
    sessions: Arc<dyn SessionRepository>,
    period: std::time::Duration,
    retention: Duration,
    observer: Option<SweepObserver>,
}

impl SessionGarbageCollector {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self {
            sessions,
            period: std::time::Duration::from_secs(DEFAULT_SWEEP_PERIOD_SECS),
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
            observer: None,
        }
    }

    pub fn with_period(mut self, period: std::time::Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_sweep_observer(mut self, observer: SweepObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Delete rows that expired more than the retention window before `now`
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let cutoff = now.checked_sub_signed(self.retention).ok_or_else(|| {
            AuthError::TimeOutOfRange(format!("session retention {}", self.retention))
        })?;
        self.sessions.delete_expired_before(cutoff).await
    }

    /// Run the sweep loop until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first sweep happens immediately. A failed sweep is logged and retried
    /// on the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "Session GC starting (period {:?}, retention {})",
            self.period,
            self.retention
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(count) => {
                            if count == 0 {
                                log::debug!("Session GC: nothing to sweep");
                            } else {
                                log::info!("Session GC: removed {} expired sessions", count);
                            }
                            if let Some(observer) = &self.observer {
                                observer(count);
                            }
                        }
                        Err(e) => log::error!("Session GC sweep failed: {}", e),
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Session GC stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn spawn(self) -> GcHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(self.run(receiver));
        GcHandle { shutdown, task }
    }
}

/// Handle to a spawned collector
pub struct GcHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GcHandle {
    /// Signal the loop to stop and wait for it
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            log::error!("Session GC task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Session};
    use crate::db::{MemoryStore, UserRepository};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every sweep but counts attempts
    struct BrokenStore {
        sweeps: AtomicUsize,
    }

    #[async_trait]
    impl SessionRepository for BrokenStore {
        async fn replace_user_session(&self, _: &Session) -> AuthResult<()> {
            Ok(())
        }
        async fn find_session(&self, _: &str) -> AuthResult<Option<Session>> {
            Ok(None)
        }
        async fn delete_session(&self, _: &str) -> AuthResult<()> {
            Ok(())
        }
        async fn delete_expired_before(&self, _: DateTime<Utc>) -> AuthResult<u64> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Err(AuthError::Storage(sqlx::Error::PoolTimedOut))
        }
        async fn ping(&self) -> AuthResult<()> {
            Ok(())
        }
    }

    async fn seed(store: &MemoryStore, name: &str, expires_at: DateTime<Utc>) {
        let user_id = store
            .create_local_user(name, &format!("{name}@example.com"), "hash")
            .await
            .unwrap();
        store
            .replace_user_session(&Session {
                token: name.to_string(),
                user_id,
                expires_at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_respects_retention() {
        let store = MemoryStore::new();
        let now = Utc::now();
        seed(&store, "ancient", now - Duration::hours(25)).await;
        seed(&store, "recent", now - Duration::hours(1)).await;
        seed(&store, "live", now + Duration::hours(1)).await;

        let gc = SessionGarbageCollector::new(Arc::new(store.clone()));
        assert_eq!(gc.sweep_once(now).await.unwrap(), 1);
        assert_eq!(store.session_count().await, 2);

        let eager = gc.with_retention(Duration::zero());
        assert_eq!(eager.sweep_once(now).await.unwrap(), 1);
        assert!(store.find_session("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_oversized_retention_is_an_error_not_a_panic() {
        let store = MemoryStore::new();
        seed(&store, "ancient", Utc::now() - Duration::hours(25)).await;

        let gc = SessionGarbageCollector::new(Arc::new(store.clone()))
            .with_retention(Duration::hours(3_000_000_000));

        assert!(matches!(
            gc.sweep_once(Utc::now()).await,
            Err(AuthError::TimeOutOfRange(_))
        ));
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sweeps_do_not_stop_the_loop() {
        let store = Arc::new(BrokenStore {
            sweeps: AtomicUsize::new(0),
        });
        let handle = SessionGarbageCollector::new(store.clone())
            .with_period(std::time::Duration::from_secs(10))
            .spawn();

        tokio::time::sleep(std::time::Duration::from_secs(35)).await;
        handle.stop().await;

        assert!(store.sweeps.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_observer_sees_sweep_counts() {
        let store = MemoryStore::new();
        seed(&store, "stale", Utc::now() - Duration::hours(48)).await;

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handle = SessionGarbageCollector::new(Arc::new(store.clone()))
            .with_sweep_observer(Arc::new(move |count| {
                counter.fetch_add(count as usize, Ordering::SeqCst);
            }))
            .spawn();

        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        handle.stop().await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_ends_the_task() {
        let handle = SessionGarbageCollector::new(Arc::new(MemoryStore::new())).spawn();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.stop())
            .await
            .unwrap();
    }
}
