//! Memoize Module
//!
//! Wraps a function so repeated calls with equal arguments reuse a cached
//! result. Each call runs the same steps:
//!
//! 1. Build the key from the namespace and the arguments. If the arguments
//!    have no canonical form, skip the cache and call the function.
//! 2. Look the key up. A hit returns the cached value without calling.
//! 3. On a miss, call the function, store the result, return it.
//!
//! `try_call` returns backend errors from steps 2 and 3 to the caller.
//! `call` is best-effort: it logs them and returns the function's result.
//! Concurrent misses on one key may each call the function.

use std::future::Future;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::async_cache::AsyncCache;
use crate::backend::{AsyncBackend, Backend};
use crate::cache::Cache;
use crate::error::Result;
use crate::key::{IntoCallArgs, KeyBuilder};
use crate::serializer::Serializer;
use crate::ttl::Ttl;

type KeyFn<'c, A> = Box<dyn Fn(&A) -> String + Send + Sync + 'c>;

/// Derives the storage key for one call, either from the custom key
/// function or from the hashed arguments. `None` means the arguments have
/// no canonical form and the call skips the cache.
fn key_or_bypass<A: IntoCallArgs>(
    keys: &KeyBuilder,
    key_fn: Option<&KeyFn<'_, A>>,
    args: &A,
) -> Option<String> {
    let built = match key_fn {
        Some(custom) => Ok(custom(args)),
        None => keys.build(&args.to_call_args()),
    };
    match built {
        Ok(key) => Some(key),
        Err(e) => {
            debug!("Bypassing cache for {}: {}", keys.namespace(), e);
            None
        }
    }
}

// == Memoized ==
/// A function bound to a [`Cache`]. Build one with [`Cache::memoize`].
///
/// # Example
/// ```
/// use pocket_cache::{Cache, JsonSerializer, MemoryBackend, Ttl};
///
/// let cache = Cache::new(MemoryBackend::new(), JsonSerializer, Ttl::NEVER);
/// let add = cache.memoize("math.add", |(a, b): (i64, i64)| a + b);
/// assert_eq!(add.call((2, 3)), 5);
/// assert_eq!(add.call((2, 3)), 5);
/// ```
pub struct Memoized<'c, B, S, A, R, F> {
    cache: &'c Cache<B, S>,
    keys: KeyBuilder,
    ttl: Option<Ttl>,
    key_fn: Option<KeyFn<'c, A>>,
    func: F,
    _marker: PhantomData<fn(A) -> R>,
}

impl<'c, B, S, A, R, F> Memoized<'c, B, S, A, R, F>
where
    B: Backend,
    S: Serializer,
    F: Fn(A) -> R,
{
    /// # Arguments
    /// * `cache` - Cache that stores results
    /// * `namespace` - Key prefix, usually the function's qualified name
    /// * `func` - Function being wrapped
    pub fn new(cache: &'c Cache<B, S>, namespace: impl Into<String>, func: F) -> Self {
        Self {
            cache,
            keys: KeyBuilder::new(namespace),
            ttl: None,
            key_fn: None,
            func,
            _marker: PhantomData,
        }
    }

    /// Stores results with `ttl` instead of the cache's default.
    pub fn ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Replaces argument hashing with a caller-supplied key function.
    pub fn key_fn(mut self, key_fn: impl Fn(&A) -> String + Send + Sync + 'c) -> Self {
        self.key_fn = Some(Box::new(key_fn));
        self
    }

    pub fn namespace(&self) -> &str {
        self.keys.namespace()
    }
}

impl<'c, B, S, A, R, F> Memoized<'c, B, S, A, R, F>
where
    B: Backend,
    S: Serializer,
    A: IntoCallArgs,
    R: Serialize + DeserializeOwned,
    F: Fn(A) -> R,
{
    /// Returns the cached result for `args`, calling the function on a miss.
    ///
    /// # Errors
    /// Backend errors from the lookup are returned without calling the
    /// function. A failed store is returned after the function ran. Arguments
    /// with no canonical form are not an error: the function is called and
    /// nothing is cached.
    pub fn try_call(&self, args: A) -> Result<R> {
        let Some(key) = key_or_bypass(&self.keys, self.key_fn.as_ref(), &args) else {
            return Ok((self.func)(args));
        };

        if let Some(value) = self.cache.get::<R>(&key)? {
            debug!("Memoize hit: namespace={}", self.keys.namespace());
            return Ok(value);
        }

        let value = (self.func)(args);
        self.store(&key, &value)?;
        Ok(value)
    }

    /// Best-effort form of [`Memoized::try_call`].
    ///
    /// Cache failures never reach the caller: they are logged and the
    /// function's own result is returned.
    pub fn call(&self, args: A) -> R {
        let Some(key) = key_or_bypass(&self.keys, self.key_fn.as_ref(), &args) else {
            return (self.func)(args);
        };

        match self.cache.get::<R>(&key) {
            Ok(Some(value)) => {
                debug!("Memoize hit: namespace={}", self.keys.namespace());
                return value;
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Memoize lookup failed for {}: {}",
                self.keys.namespace(),
                e
            ),
        }

        let value = (self.func)(args);
        if let Err(e) = self.store(&key, &value) {
            warn!(
                "Memoize store failed for {}: {}",
                self.keys.namespace(),
                e
            );
        }
        value
    }

    fn store(&self, key: &str, value: &R) -> Result<()> {
        match self.ttl {
            Some(ttl) => self.cache.set_with_ttl(key, value, ttl),
            None => self.cache.set(key, value),
        }
    }
}

/// Wraps `func` into a plain closure with the same argument and result types.
///
/// # Example
/// ```
/// use pocket_cache::{memoize, Cache, JsonSerializer, MemoryBackend, Ttl};
///
/// let cache = Cache::new(MemoryBackend::new(), JsonSerializer, Ttl::NEVER);
/// let square = memoize(&cache, "math.square", |(x,): (u32,)| x * x);
/// assert_eq!(square((9,)), 81);
/// ```
pub fn memoize<'c, B, S, A, R, F>(
    cache: &'c Cache<B, S>,
    namespace: impl Into<String>,
    func: F,
) -> impl Fn(A) -> R + 'c
where
    B: Backend,
    S: Serializer,
    A: IntoCallArgs + 'c,
    R: Serialize + DeserializeOwned + 'c,
    F: Fn(A) -> R + 'c,
{
    let memoized = Memoized::new(cache, namespace, func);
    move |args| memoized.call(args)
}

// == Async Memoized ==
/// A function returning a future, bound to an [`AsyncCache`]. Build one with
/// [`AsyncCache::memoize`].
pub struct AsyncMemoized<'c, B, S, A, R, F> {
    cache: &'c AsyncCache<B, S>,
    keys: KeyBuilder,
    ttl: Option<Ttl>,
    key_fn: Option<KeyFn<'c, A>>,
    func: F,
    _marker: PhantomData<fn(A) -> R>,
}

impl<'c, B, S, A, R, F, Fut> AsyncMemoized<'c, B, S, A, R, F>
where
    B: AsyncBackend,
    S: Serializer,
    F: Fn(A) -> Fut,
    Fut: Future<Output = R>,
{
    pub fn new(cache: &'c AsyncCache<B, S>, namespace: impl Into<String>, func: F) -> Self {
        Self {
            cache,
            keys: KeyBuilder::new(namespace),
            ttl: None,
            key_fn: None,
            func,
            _marker: PhantomData,
        }
    }

    pub fn ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn key_fn(mut self, key_fn: impl Fn(&A) -> String + Send + Sync + 'c) -> Self {
        self.key_fn = Some(Box::new(key_fn));
        self
    }

    pub fn namespace(&self) -> &str {
        self.keys.namespace()
    }
}

impl<'c, B, S, A, R, F, Fut> AsyncMemoized<'c, B, S, A, R, F>
where
    B: AsyncBackend,
    S: Serializer,
    A: IntoCallArgs,
    R: Serialize + DeserializeOwned,
    F: Fn(A) -> Fut,
    Fut: Future<Output = R>,
{
    /// Async counterpart of [`Memoized::try_call`]. A timed out lookup or
    /// store is returned as `Timeout`.
    pub async fn try_call(&self, args: A) -> Result<R> {
        let Some(key) = key_or_bypass(&self.keys, self.key_fn.as_ref(), &args) else {
            return Ok((self.func)(args).await);
        };

        if let Some(value) = self.cache.get::<R>(&key).await? {
            debug!("Memoize hit: namespace={}", self.keys.namespace());
            return Ok(value);
        }

        let value = (self.func)(args).await;
        self.store(&key, &value).await?;
        Ok(value)
    }

    /// Async counterpart of [`Memoized::call`]. A timed out lookup counts
    /// as a miss; a timed out store is logged.
    pub async fn call(&self, args: A) -> R {
        let Some(key) = key_or_bypass(&self.keys, self.key_fn.as_ref(), &args) else {
            return (self.func)(args).await;
        };

        match self.cache.get::<R>(&key).await {
            Ok(Some(value)) => {
                debug!("Memoize hit: namespace={}", self.keys.namespace());
                return value;
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Memoize lookup failed for {}: {}",
                self.keys.namespace(),
                e
            ),
        }

        let value = (self.func)(args).await;
        if let Err(e) = self.store(&key, &value).await {
            warn!(
                "Memoize store failed for {}: {}",
                self.keys.namespace(),
                e
            );
        }
        value
    }

    async fn store(&self, key: &str, value: &R) -> Result<()> {
        match self.ttl {
            Some(ttl) => self.cache.set_with_ttl(key, value, ttl).await,
            None => self.cache.set(key, value).await,
        }
    }
}
