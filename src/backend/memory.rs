//! Memory Backend Module
//!
//! In-process map with lazy expiry on reads and optional active expiry from a
//! background sweep. One mutex guards the whole map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{AsyncBackend, Backend, CacheEntry, CacheStats};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::SweepTask;
use crate::ttl::Ttl;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

// == Memory Store ==
/// Lock-guarded entry map shared by a [`MemoryBackend`] and its sweep task.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// Returns the value if present and unexpired.
    ///
    /// An expired entry is removed here and counted as a miss.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        match state.entries.get(key) {
            None => {
                state.stats.record_miss();
                return None;
            }
            Some(entry) if !entry.is_expired_at(now) => {
                debug!(
                    "Cache hit key={}, ttl_remaining={:?}",
                    key,
                    entry.ttl_remaining()
                );
                let value = entry.value.clone();
                state.stats.record_hit();
                return Some(value);
            }
            Some(_) => {}
        }

        state.entries.remove(key);
        state.stats.record_miss();
        state.stats.record_expirations(1);
        state.stats.set_total_entries(state.entries.len());
        debug!("Lazily expired key={}", key);
        None
    }

    // == Set ==
    /// Stores a value, replacing both value and deadline of any prior entry.
    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) {
        let entry = CacheEntry::new(value, ttl);
        let mut state = self.state.lock();
        state.entries.insert(key.to_string(), entry);
        let len = state.entries.len();
        state.stats.record_write();
        state.stats.set_total_entries(len);
    }

    // == Delete ==
    /// Removes an entry. Returns whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.remove(key).is_some();
        let len = state.entries.len();
        state.stats.set_total_entries(len);
        removed
    }

    // == Clear ==
    /// Drops every entry. Returns how many were stored.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.stats.set_total_entries(0);
        count
    }

    // == Purge Expired ==
    /// Removes all expired entries and returns how many were removed.
    ///
    /// Deadlines are read under the lock at the moment each entry is
    /// examined, so an entry renewed by a concurrent `set` is never dropped.
    pub fn purge_expired(&self) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - state.entries.len();

        state.stats.record_expirations(removed);
        state.stats.set_total_entries(state.entries.len());
        removed
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        stats
    }

    /// Number of physically stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

// == Memory Backend ==
/// Cloneable handle to an in-process store.
///
/// Clones share the store. When a sweep is attached, it stops once the last
/// clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    sweeper: Option<Arc<SweepTask>>,
}

impl MemoryBackend {
    // == Constructors ==
    /// Creates a backend that relies on lazy expiry only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with a background sweep every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_sweep(interval: Duration) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let sweeper = SweepTask::spawn(Arc::downgrade(&store), interval)?;
        info!("Memory backend created with sweep interval {:?}", interval);

        Ok(Self {
            store,
            sweeper: Some(Arc::new(sweeper)),
        })
    }

    /// Creates a backend from configuration.
    ///
    /// The sweep is enabled when an interval is configured and a tokio
    /// runtime is available; otherwise the backend uses lazy expiry only.
    pub fn from_config(config: &CacheConfig) -> Self {
        let Some(interval) = config.sweep_interval() else {
            return Self::new();
        };

        match Self::with_sweep(interval) {
            Ok(backend) => backend,
            Err(e) => {
                debug!("Background sweep disabled: {}", e);
                Self::new()
            }
        }
    }

    // == Accessors ==
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Runs one sweep pass on the calling thread.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.store.get(key))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        debug!("SET key={}, size={}, ttl={:?}", key, value.len(), ttl.duration());
        self.store.set(key, value, ttl);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let removed = self.store.delete(key);
        debug!("DELETE key={}, removed={}", key, removed);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let removed = self.store.clear();
        debug!("CLEAR removed {} entries", removed);
        Ok(())
    }
}

// Map operations never suspend.
#[async_trait]
impl AsyncBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Backend::get(self, key)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        Backend::set(self, key, value, ttl)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Backend::delete(self, key)
    }

    async fn clear(&self) -> Result<()> {
        Backend::clear(self)
    }
}
