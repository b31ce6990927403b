//! Redis Backend Module
//!
//! Delegates storage and expiry to a Redis server. Every key is prefixed with
//! a namespace so a shared server can hold unrelated data safely, and
//! `clear` only touches this namespace.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::{Client, Connection};
use tracing::{debug, info, warn};

use super::{AsyncBackend, Backend};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::ttl::Ttl;

const SCAN_BATCH: usize = 100;

/// Longest expiry handed to `PSETEX`. Redis rejects spans whose deadline
/// would overflow its signed millisecond clock, so longer TTLs are stored
/// without expiry.
const MAX_EXPIRE_MS: u64 = i64::MAX as u64 / 2;

// == Redis Backend ==
/// Redis-backed store.
///
/// The blocking API keeps one connection and reconnects after a failure.
/// The async API uses a multiplexed connection per call.
pub struct RedisBackend {
    client: Client,
    namespace: String,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Creates a backend for `url` (e.g. `redis://localhost:6379`).
    ///
    /// No connection is made until the first operation.
    pub fn open(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(CacheError::Config(
                "Redis namespace cannot be empty".to_string(),
            ));
        }
        let client = Client::open(url)
            .map_err(|e| CacheError::Config(format!("Invalid Redis URL: {}", e)))?;
        info!("Redis backend configured with namespace={}", namespace);

        Ok(Self {
            client,
            namespace,
            conn: Mutex::new(None),
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::open(&config.redis_url, config.namespace.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Full key as stored in Redis.
    pub fn namespaced_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn match_pattern(&self) -> String {
        format!("{}:*", escape_glob(&self.namespace))
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut slot = self.conn.lock();
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.client.get_connection()?,
        };

        match op(&mut conn) {
            Ok(value) => {
                *slot = Some(conn);
                Ok(value)
            }
            Err(e) => {
                // The connection is left out of the slot; the next call reconnects
                warn!("Redis command failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn async_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

/// Escapes Redis glob metacharacters.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn set_command(key: &str, value: &[u8], ttl: Ttl) -> redis::Cmd {
    match ttl.as_millis_ceil().filter(|ms| *ms <= MAX_EXPIRE_MS) {
        Some(ms) => {
            let mut cmd = redis::cmd("PSETEX");
            cmd.arg(key).arg(ms).arg(value);
            cmd
        }
        None => {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            cmd
        }
    }
}

fn scan_command(cursor: u64, pattern: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor)
        .arg("MATCH")
        .arg(pattern)
        .arg("COUNT")
        .arg(SCAN_BATCH);
    cmd
}

impl Backend for RedisBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full_key = self.namespaced_key(key);
        self.with_connection(|conn| redis::cmd("GET").arg(&full_key).query(conn))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        let full_key = self.namespaced_key(key);
        debug!("SET key={}, size={}, ttl={:?}", full_key, value.len(), ttl.duration());
        let cmd = set_command(&full_key, &value, ttl);
        self.with_connection(|conn| cmd.query(conn))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.namespaced_key(key);
        debug!("DELETE key={}", full_key);
        self.with_connection(|conn| {
            let _: i64 = redis::cmd("DEL").arg(&full_key).query(conn)?;
            Ok(())
        })
    }

    fn clear(&self) -> Result<()> {
        let pattern = self.match_pattern();
        let removed = self.with_connection(|conn| {
            let mut cursor = 0u64;
            let mut removed = 0i64;
            loop {
                let (next, keys): (u64, Vec<String>) = scan_command(cursor, &pattern).query(conn)?;
                if !keys.is_empty() {
                    removed += redis::cmd("DEL").arg(&keys).query::<i64>(conn)?;
                }
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Ok(removed)
        })?;
        debug!("CLEAR removed {} keys matching {}", removed, pattern);
        Ok(())
    }
}

#[async_trait]
impl AsyncBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full_key = self.namespaced_key(key);
        let mut conn = self.async_connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(&full_key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        let full_key = self.namespaced_key(key);
        debug!("SET key={}, size={}, ttl={:?}", full_key, value.len(), ttl.duration());
        let mut conn = self.async_connection().await?;
        let _: () = set_command(&full_key, &value, ttl)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.namespaced_key(key);
        debug!("DELETE key={}", full_key);
        let mut conn = self.async_connection().await?;
        let _: i64 = redis::cmd("DEL").arg(&full_key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let pattern = self.match_pattern();
        let mut conn = self.async_connection().await?;
        let mut cursor = 0u64;
        let mut removed = 0i64;
        loop {
            let (next, keys): (u64, Vec<String>) = scan_command(cursor, &pattern)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let count: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += count;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!("CLEAR removed {} keys matching {}", removed, pattern);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    // Nothing listens on port 1, so every connection attempt is refused.
    const DEAD_URL: &str = "redis://127.0.0.1:1/";

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = RedisBackend::open("not a url", "ns");
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let result = RedisBackend::open("redis://localhost:6379", "");
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_namespaced_key() {
        let backend = RedisBackend::open("redis://localhost:6379", "app").unwrap();
        assert_eq!(backend.namespaced_key("user:1"), "app:user:1");
        assert_eq!(backend.namespace(), "app");
    }

    #[test]
    fn test_match_pattern_escapes_glob() {
        let backend = RedisBackend::open("redis://localhost:6379", "a*b[1]").unwrap();
        assert_eq!(backend.match_pattern(), "a\\*b\\[1\\]:*");
    }

    fn packed(cmd: &redis::Cmd) -> String {
        String::from_utf8_lossy(&cmd.get_packed_command()).into_owned()
    }

    #[test]
    fn test_set_command_uses_millisecond_expiry() {
        let ttl = Ttl::new(Duration::from_micros(1500)).unwrap();
        let cmd = packed(&set_command("ns:k", b"v", ttl));
        assert!(cmd.contains("PSETEX"));
        assert!(cmd.contains("\r\n2\r\n"));

        let cmd = packed(&set_command("ns:k", b"v", Ttl::NEVER));
        assert!(!cmd.contains("PSETEX"));
    }

    #[test]
    fn test_huge_ttl_is_stored_without_expiry() {
        for span in [Duration::MAX, Duration::from_secs(u64::MAX / 1000 + 1)] {
            let cmd = packed(&set_command("ns:k", b"v", Ttl::new(span).unwrap()));
            assert!(!cmd.contains("PSETEX"), "unexpected expiry for {:?}", span);
            assert!(cmd.contains("SET"));
        }

        let year = Ttl::new(Duration::from_secs(365 * 24 * 3600)).unwrap();
        assert!(packed(&set_command("ns:k", b"v", year)).contains("PSETEX"));
    }

    #[test]
    fn test_unreachable_server_is_unavailable_not_miss() {
        let backend = RedisBackend::open(DEAD_URL, "ns").unwrap();

        let result = Backend::get(&backend, "k");
        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));

        let result = Backend::set(&backend, "k", b"v".to_vec(), Ttl::NEVER);
        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_async_unreachable_server_is_unavailable() {
        let backend = RedisBackend::open(DEAD_URL, "ns").unwrap();

        let result = AsyncBackend::get(&backend, "k").await;
        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));

        let result = AsyncBackend::clear(&backend).await;
        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));
    }
}
