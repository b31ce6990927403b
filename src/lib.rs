//! Pocket Cache - A unified caching facade
//!
//! One `get`/`set`/`delete`/`clear` API over interchangeable storage
//! backends (in-process memory, redis, a filesystem directory) and
//! serialization formats (JSON, MessagePack), plus memoization of function
//! calls keyed by their arguments.

pub mod async_cache;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod memoize;
pub mod serializer;
pub mod tasks;
pub mod ttl;

pub use async_cache::AsyncCache;
pub use backend::{
    AsyncBackend, Backend, CacheStats, FileSystemBackend, MemoryBackend, RedisBackend,
};
pub use cache::Cache;
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use key::{make_key, CallArgs, IntoCallArgs, KeyBuilder};
pub use memoize::{memoize, AsyncMemoized, Memoized};
pub use serializer::{JsonSerializer, MsgPackSerializer, Serializer};
pub use ttl::{IntoTtl, Ttl};
