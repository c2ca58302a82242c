//! Periodic memory reclamation.
//!
//! The sweeper never decides expiry itself. Each run asks the store to
//! re-check every stored key with the same test `get` applies, so idle
//! stale entries do not accumulate. Correctness never depends on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::store::{CacheStore, RawStore};

/// Default period between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A handle to control a running sweeper.
pub struct SweeperHandle {
    /// Flag to signal the sweeper to stop
    stop_flag: Arc<AtomicBool>,
    /// Join handle for the sweeper task
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to finish.
    ///
    /// A sweep in progress is cancelled at its next await point.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        debug!("cache sweeper stopped");
    }

    /// Check if the sweeper is still running.
    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::SeqCst)
            && self
                .task_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Spawn a background task that sweeps `store` every `period`.
///
/// The first sweep happens one full `period` after spawning. Sweep errors
/// are logged and the task keeps running.
///
/// # Panics
///
/// Panics if `period` is zero (as `tokio::time::interval` does).
pub fn spawn_sweeper<S>(store: Arc<CacheStore<S>>, period: Duration) -> SweeperHandle
where
    S: RawStore + 'static,
{
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();

    let task_handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            backend = store.backend().name(),
            period_secs = period.as_secs_f64(),
            "cache sweeper started"
        );

        loop {
            ticker.tick().await;
            if stop_flag_clone.load(Ordering::SeqCst) {
                break;
            }

            match store.sweep().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "cache sweep removed stale entries"),
                Err(e) => warn!(error = %e, "cache sweep failed"),
            }
        }
    });

    SweeperHandle {
        stop_flag,
        task_handle: Some(task_handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryStore;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_sweeper_reclaims_idle_stale_entries() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(CacheStore::with_clock(
            InMemoryStore::new(),
            Arc::new(clock.clone()),
        ));

        store
            .put("idle", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.put("forever", "v", None).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let handle = spawn_sweeper(store.clone(), Duration::from_millis(20));
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.stats().size, Some(1));
        assert!(store.stats().evictions >= 1);

        handle.stop().await;
        assert_eq!(store.get("forever").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_stopped_sweeper_no_longer_runs() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(CacheStore::with_clock(
            InMemoryStore::new(),
            Arc::new(clock.clone()),
        ));

        let handle = spawn_sweeper(store.clone(), Duration::from_millis(20));
        handle.stop().await;

        store
            .put("k", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.stats().size, Some(1));
    }
}
