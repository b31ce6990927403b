//! TTL Module
//!
//! A validated time-to-live: either "never expires" or a strictly positive span.

use std::time::Duration;

use crate::error::{CacheError, Result};

// == Ttl ==
/// Time-to-live attached to a stored entry.
///
/// The only way to build a finite `Ttl` is through a validating constructor,
/// so a zero or negative span never reaches a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ttl(Option<Duration>);

impl Ttl {
    /// Entry never expires.
    pub const NEVER: Ttl = Ttl(None);

    // == Constructors ==
    /// Creates a finite TTL. Fails with `InvalidTtl` when `duration` is zero.
    pub fn new(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(CacheError::InvalidTtl(
                "TTL must be greater than zero".to_string(),
            ));
        }
        Ok(Self(Some(duration)))
    }

    /// Creates a TTL from signed seconds.
    pub fn from_secs(secs: i64) -> Result<Self> {
        if secs <= 0 {
            return Err(CacheError::InvalidTtl(format!(
                "TTL must be greater than zero, got {}s",
                secs
            )));
        }
        Self::new(Duration::from_secs(secs as u64))
    }

    /// Creates a TTL from signed milliseconds.
    pub fn from_millis(millis: i64) -> Result<Self> {
        if millis <= 0 {
            return Err(CacheError::InvalidTtl(format!(
                "TTL must be greater than zero, got {}ms",
                millis
            )));
        }
        Self::new(Duration::from_millis(millis as u64))
    }

    // == Accessors ==
    /// Returns the span, or `None` for [`Ttl::NEVER`].
    pub fn duration(&self) -> Option<Duration> {
        self.0
    }

    pub fn is_never(&self) -> bool {
        self.0.is_none()
    }

    /// Span in whole milliseconds, rounded up so sub-millisecond TTLs stay
    /// positive for backends with millisecond resolution. Spans beyond
    /// `u64::MAX` milliseconds saturate.
    pub fn as_millis_ceil(&self) -> Option<u64> {
        self.0.map(|d| {
            let partial = u128::from(d.subsec_nanos() % 1_000_000 != 0);
            u64::try_from(d.as_millis() + partial).unwrap_or(u64::MAX)
        })
    }
}

// == IntoTtl ==
/// Conversion into a validated [`Ttl`].
pub trait IntoTtl {
    fn into_ttl(self) -> Result<Ttl>;
}

impl IntoTtl for Ttl {
    fn into_ttl(self) -> Result<Ttl> {
        Ok(self)
    }
}

impl IntoTtl for Duration {
    fn into_ttl(self) -> Result<Ttl> {
        Ttl::new(self)
    }
}

/// Seconds.
impl IntoTtl for i64 {
    fn into_ttl(self) -> Result<Ttl> {
        Ttl::from_secs(self)
    }
}

/// Seconds.
impl IntoTtl for i32 {
    fn into_ttl(self) -> Result<Ttl> {
        Ttl::from_secs(i64::from(self))
    }
}

/// Seconds.
impl IntoTtl for u64 {
    fn into_ttl(self) -> Result<Ttl> {
        Ttl::new(Duration::from_secs(self))
    }
}

impl IntoTtl for chrono::TimeDelta {
    fn into_ttl(self) -> Result<Ttl> {
        let span = self.to_std().map_err(|_| {
            CacheError::InvalidTtl(format!(
                "TTL must be greater than zero, got {}ms",
                self.num_milliseconds()
            ))
        })?;
        Ttl::new(span)
    }
}
