//! Cache Facade Module
//!
//! Blocking client API: serializes values, applies the default TTL and hands
//! bytes to the backend.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{validate_key, Backend};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::memoize::Memoized;
use crate::serializer::Serializer;
use crate::ttl::{IntoTtl, Ttl};

// == Cache ==
/// A cache over one backend and one serializer, both fixed at construction.
///
/// # Example
/// ```
/// use pocket_cache::{Cache, JsonSerializer, MemoryBackend, Ttl};
///
/// let cache = Cache::new(MemoryBackend::new(), JsonSerializer, Ttl::from_secs(60).unwrap());
/// cache.set("greeting", "Hello, World!").unwrap();
/// assert_eq!(cache.get::<String>("greeting").unwrap().as_deref(), Some("Hello, World!"));
/// ```
#[derive(Debug, Clone)]
pub struct Cache<B, S> {
    backend: B,
    serializer: S,
    default_ttl: Ttl,
}

impl<B: Backend, S: Serializer> Cache<B, S> {
    // == Constructor ==
    /// Creates a cache.
    ///
    /// # Arguments
    /// * `backend` - Storage for encoded values
    /// * `serializer` - Codec for values
    /// * `default_ttl` - TTL used by [`Cache::set`]
    pub fn new(backend: B, serializer: S, default_ttl: Ttl) -> Self {
        Self {
            backend,
            serializer,
            default_ttl,
        }
    }

    /// Creates a cache using the configured default TTL.
    pub fn from_config(backend: B, serializer: S, config: &CacheConfig) -> Self {
        Self::new(backend, serializer, config.default_ttl())
    }

    // == Get ==
    /// Retrieves a value.
    ///
    /// Returns `Ok(None)` when the key is absent, expired, or holds bytes
    /// that no longer decode as `T`. Backend failures are returned as errors.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;

        let Some(bytes) = self.backend.get(key)? else {
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

    /// Retrieves a value, falling back to `default` on a miss.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Returns true if the backend holds a live entry for `key`.
    pub fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.backend.get(key)?.is_some())
    }

    // == Set ==
    /// Stores a value with the default TTL.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        validate_key(key)?;
        self.store(key, value, self.default_ttl)
    }

    /// Stores a value with an explicit TTL.
    ///
    /// Key, TTL and value are all validated before the backend is touched.
    pub fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: impl IntoTtl,
    ) -> Result<()> {
        validate_key(key)?;
        let ttl = ttl.into_ttl()?;
        self.store(key, value, ttl)
    }

    fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Ttl) -> Result<()> {
        let bytes = self.serializer.serialize(value)?;
        self.backend.set(key, bytes, ttl)
    }

    // == Delete ==
    pub fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.backend.delete(key)
    }

    // == Clear ==
    pub fn clear(&self) -> Result<()> {
        self.backend.clear()
    }

    // == Memoize ==
    /// Wraps `func` so results are cached per distinct argument set.
    ///
    /// See [`Memoized`] for the lookup rules.
    pub fn memoize<A, R, F>(
        &self,
        namespace: impl Into<String>,
        func: F,
    ) -> Memoized<'_, B, S, A, R, F>
    where
        F: Fn(A) -> R,
    {
        Memoized::new(self, namespace, func)
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
}
