//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::ttl::Ttl;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default TTL in seconds for entries without explicit TTL, 0 = never expire
    pub default_ttl: u64,
    /// Memory backend sweep interval in milliseconds, 0 = no background sweep
    pub sweep_interval_ms: u64,
    /// Directory used by the filesystem backend
    pub cache_dir: PathBuf,
    /// Permission bits for the cache directory
    pub dir_mode: u32,
    /// Permission bits for cache files
    pub file_mode: u32,
    /// Connection URL for the redis backend
    pub redis_url: String,
    /// Prefix applied to every key in a shared store
    pub namespace: String,
    /// Per-operation timeout for the async facade in milliseconds, 0 = none
    pub op_timeout_ms: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `POCKET_CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `POCKET_CACHE_SWEEP_INTERVAL_MS` - Sweep interval (default: 1000)
    /// - `POCKET_CACHE_DIR` - Filesystem backend directory (default: .cache)
    /// - `POCKET_CACHE_DIR_MODE` - Octal directory mode (default: 700)
    /// - `POCKET_CACHE_FILE_MODE` - Octal file mode (default: 600)
    /// - `POCKET_CACHE_REDIS_URL` - Redis URL (default: redis://127.0.0.1:6379)
    /// - `POCKET_CACHE_NAMESPACE` - Key namespace (default: pocket_cache)
    /// - `POCKET_CACHE_OP_TIMEOUT_MS` - Async operation timeout (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: parse_var("POCKET_CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            sweep_interval_ms: parse_var("POCKET_CACHE_SWEEP_INTERVAL_MS")
                .unwrap_or(defaults.sweep_interval_ms),
            cache_dir: env::var("POCKET_CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            dir_mode: parse_mode("POCKET_CACHE_DIR_MODE").unwrap_or(defaults.dir_mode),
            file_mode: parse_mode("POCKET_CACHE_FILE_MODE").unwrap_or(defaults.file_mode),
            redis_url: env::var("POCKET_CACHE_REDIS_URL").unwrap_or(defaults.redis_url),
            namespace: env::var("POCKET_CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            op_timeout_ms: parse_var("POCKET_CACHE_OP_TIMEOUT_MS")
                .unwrap_or(defaults.op_timeout_ms),
        }
    }

    /// Default TTL as a validated [`Ttl`].
    pub fn default_ttl(&self) -> Ttl {
        match self.default_ttl {
            0 => Ttl::NEVER,
            secs => Ttl::new(Duration::from_secs(secs)).unwrap_or(Ttl::NEVER),
        }
    }

    /// Sweep interval, or `None` when the background sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }

    /// Async operation timeout, or `None` when disabled.
    pub fn op_timeout(&self) -> Option<Duration> {
        (self.op_timeout_ms > 0).then(|| Duration::from_millis(self.op_timeout_ms))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            sweep_interval_ms: 1000,
            cache_dir: PathBuf::from(".cache"),
            dir_mode: 0o700,
            file_mode: 0o600,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            namespace: "pocket_cache".to_string(),
            op_timeout_ms: 0,
        }
    }
}

fn parse_var(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_mode(name: &str) -> Option<u32> {
    env::var(name)
        .ok()
        .and_then(|v| u32::from_str_radix(v.trim().trim_start_matches("0o"), 8).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.sweep_interval_ms, 1000);
        assert_eq!(config.dir_mode, 0o700);
        assert_eq!(config.file_mode, 0o600);
        assert_eq!(config.namespace, "pocket_cache");
        assert_eq!(config.op_timeout(), None);
    }

    #[test]
    fn test_default_ttl_conversion() {
        let mut config = CacheConfig::default();
        assert_eq!(
            config.default_ttl().duration(),
            Some(Duration::from_secs(300))
        );

        config.default_ttl = 0;
        assert!(config.default_ttl().is_never());
    }

    #[test]
    fn test_sweep_interval_disabled_at_zero() {
        let mut config = CacheConfig::default();
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(1)));

        config.sweep_interval_ms = 0;
        assert_eq!(config.sweep_interval(), None);
    }

    #[test]
    fn test_config_from_env() {
        // Single test touches the env so parallel tests don't race on it
        env::set_var("POCKET_CACHE_DEFAULT_TTL", "60");
        env::set_var("POCKET_CACHE_FILE_MODE", "0o640");
        env::set_var("POCKET_CACHE_SWEEP_INTERVAL_MS", "not-a-number");

        let config = CacheConfig::from_env();
        assert_eq!(config.default_ttl, 60);
        assert_eq!(config.file_mode, 0o640);
        assert_eq!(config.sweep_interval_ms, 1000);

        env::remove_var("POCKET_CACHE_DEFAULT_TTL");
        env::remove_var("POCKET_CACHE_FILE_MODE");
        env::remove_var("POCKET_CACHE_SWEEP_INTERVAL_MS");
    }
}
