//! TTL Sweep Task
//!
//! Background task that periodically removes expired memory-backend entries,
//! so keys that are written once and never read again do not pile up.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::backend::MemoryStore;
use crate::error::{CacheError, Result};

// == Sweep Task ==
/// Handle to a running sweep. Dropping it aborts the task.
///
/// The task only holds a weak reference to the store and also exits on its
/// own once the store has been dropped.
#[derive(Debug)]
pub struct SweepTask {
    handle: JoinHandle<()>,
}

impl SweepTask {
    /// Spawns a sweep over `store` on the current tokio runtime.
    ///
    /// # Arguments
    /// * `store` - Weak reference to the store to sweep
    /// * `interval` - Time between sweeps, must be non-zero
    ///
    /// # Errors
    /// `Config` when `interval` is zero or no runtime is running.
    pub fn spawn(store: Weak<MemoryStore>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(CacheError::Config(
                "Sweep interval must be greater than zero".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            CacheError::Config(format!("Background sweep requires a tokio runtime: {}", e))
        })?;

        let handle = runtime.spawn(async move {
            info!("Starting TTL sweep task with interval of {:?}", interval);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(store) = store.upgrade() else {
                    debug!("TTL sweep: store dropped, stopping");
                    break;
                };
                let removed = store.purge_expired();
                drop(store);

                if removed > 0 {
                    info!("TTL sweep: removed {} expired entries", removed);
                } else {
                    debug!("TTL sweep: no expired entries found");
                }
            }
        });

        Ok(Self { handle })
    }

    /// Returns true once the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("TTL sweep task aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::ttl::Ttl;

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let store = Arc::new(MemoryStore::new());
        store.set("expire_soon", b"value".to_vec(), Ttl::from_millis(30).unwrap());

        let task = SweepTask::spawn(Arc::downgrade(&store), Duration::from_millis(20)).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.len(), 0, "Expired entry should have been swept");
        drop(task);
    }

    #[tokio::test]
    async fn test_sweep_preserves_valid_entries() {
        let store = Arc::new(MemoryStore::new());
        store.set("long_lived", b"value".to_vec(), Ttl::from_secs(3600).unwrap());
        store.set("forever", b"value".to_vec(), Ttl::NEVER);

        let _task = SweepTask::spawn(Arc::downgrade(&store), Duration::from_millis(20)).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("long_lived"), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_sweep_stops_when_store_dropped() {
        let store = Arc::new(MemoryStore::new());
        let task = SweepTask::spawn(Arc::downgrade(&store), Duration::from_millis(10)).unwrap();

        drop(store);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(task.is_finished(), "Task should exit once the store is gone");
    }

    #[tokio::test]
    async fn test_sweep_aborted_on_drop() {
        let store = Arc::new(MemoryStore::new());
        store.set("k", b"v".to_vec(), Ttl::from_millis(20).unwrap());

        let task = SweepTask::spawn(Arc::downgrade(&store), Duration::from_millis(50)).unwrap();
        drop(task);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // No sweep ran, so the expired entry is still physically present
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let store = Arc::new(MemoryStore::new());
        let result = SweepTask::spawn(Arc::downgrade(&store), Duration::ZERO);
        assert!(matches!(result, Err(CacheError::Config(_))));
    }
}
