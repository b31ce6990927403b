//! Async Cache Facade Module
//!
//! Same contract as [`crate::Cache`] over an [`AsyncBackend`]. Calls suspend
//! only while the backend does I/O. With a timeout set, a backend call that
//! runs past it is dropped and the operation fails with `Timeout`.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{validate_key, AsyncBackend};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::memoize::AsyncMemoized;
use crate::serializer::Serializer;
use crate::ttl::{IntoTtl, Ttl};

// == Async Cache ==
#[derive(Debug, Clone)]
pub struct AsyncCache<B, S> {
    backend: B,
    serializer: S,
    default_ttl: Ttl,
    op_timeout: Option<Duration>,
}

impl<B: AsyncBackend, S: Serializer> AsyncCache<B, S> {
    /// Creates a cache with no operation timeout.
    pub fn new(backend: B, serializer: S, default_ttl: Ttl) -> Self {
        Self {
            backend,
            serializer,
            default_ttl,
            op_timeout: None,
        }
    }

    /// Creates a cache with the configured default TTL and operation timeout.
    pub fn from_config(backend: B, serializer: S, config: &CacheConfig) -> Self {
        Self {
            backend,
            serializer,
            default_ttl: config.default_ttl(),
            op_timeout: config.op_timeout(),
        }
    }

    /// Bounds every backend call by `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.op_timeout = Some(limit);
        self
    }

    // == Get ==
    /// Retrieves a value. Undecodable entries are reported as misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;

        let Some(bytes) = self.timed("get", self.backend.get(key)).await? else {
            debug!("Cache miss key={}", key);
            return Ok(None);
        };

        match self.serializer.deserialize(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(
                    "Treating undecodable entry as a miss: key={}, serializer={}, error={}",
                    key,
                    self.serializer.name(),
                    e
                );
                Ok(None)
            }
        }
    }

    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.timed("get", self.backend.get(key)).await?.is_some())
    }

    // == Set ==
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        validate_key(key)?;
        self.store(key, value, self.default_ttl).await
    }

    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: impl IntoTtl,
    ) -> Result<()> {
        validate_key(key)?;
        let ttl = ttl.into_ttl()?;
        self.store(key, value, ttl).await
    }

    async fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Ttl) -> Result<()> {
        let bytes = self.serializer.serialize(value)?;
        self.timed("set", self.backend.set(key, bytes, ttl)).await
    }

    // == Delete / Clear ==
    pub async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.timed("delete", self.backend.delete(key)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.timed("clear", self.backend.clear()).await
    }

    // == Memoize ==
    /// Wraps an async function so results are cached per distinct argument set.
    pub fn memoize<A, R, F, Fut>(
        &self,
        namespace: impl Into<String>,
        func: F,
    ) -> AsyncMemoized<'_, B, S, A, R, F>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = R>,
    {
        AsyncMemoized::new(self, namespace, func)
    }

    // == Accessors ==
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    pub fn default_ttl(&self) -> Ttl {
        self.default_ttl
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout
    }

    async fn timed<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let Some(limit) = self.op_timeout else {
            return call.await;
        };

        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Backend {} timed out after {:?}", op, limit);
                Err(CacheError::Timeout(limit))
            }
        }
    }
}
