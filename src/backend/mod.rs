//! Backend Module
//!
//! Byte-oriented key-value stores with backend-enforced TTL. Every variant
//! honors the same contract: an absent or expired key is `Ok(None)`, never an
//! error, and a broken backend is `BackendUnavailable`, never a miss.

mod entry;
mod filesystem;
mod memory;
mod remote;
mod stats;


use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::ttl::Ttl;

// Re-export public types
pub use entry::CacheEntry;
pub use filesystem::{FileSystemBackend, FileSystemBackendBuilder};
pub use memory::{MemoryBackend, MemoryStore};
pub use remote::RedisBackend;
pub use stats::CacheStats;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

// == Key Validation ==
/// Rejects keys the facades must never hand to a backend.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

// == Backend Trait ==
/// Blocking storage contract.
///
/// Implementations may block the calling thread for the duration of their
/// I/O. `set` fully replaces any previous value and expiry for `key`, and a
/// concurrent `get` observes either the old or the new value.
pub trait Backend: Send + Sync {
    /// Returns the stored bytes, or `None` if the key is absent or expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key` with the given TTL.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()>;

    /// Removes `key`. Removing a missing key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Removes every entry owned by this backend instance or namespace.
    fn clear(&self) -> Result<()>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        (**self).set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        (**self).set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

// == Async Backend Trait ==
/// Suspending variant of [`Backend`] with the same contract. Implementations
/// suspend only at their I/O boundary; dropping a call's future abandons it.
#[async_trait]
pub trait AsyncBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[async_trait]
impl<B: AsyncBackend + ?Sized> AsyncBackend for Arc<B> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
}

#[async_trait]
impl<B: AsyncBackend + ?Sized> AsyncBackend for Box<B> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
}
