//! Result and option types shared by the cache layer.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Something that can be turned into a stable cache key.
pub trait QueryKey {
  /// Fixed-length key; equal queries must hash equally.
  fn cache_hash(&self) -> String;

  /// Human-readable form for logs.
  fn description(&self) -> String;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was stored (if served from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
    }
  }

  pub fn is_cached(&self) -> bool {
    self.source != CacheSource::Network
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Produced by this call (or by a flight it joined)
  Network,
  /// Served from cache, still fresh
  CacheFresh,
  /// Served from cache past `stale_after`; a background refresh was started
  CacheStale,
}

/// Per-call knobs for [`CacheLayer::get`](super::CacheLayer::get).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
  /// Overrides the layer's default time-to-live
  pub ttl: Option<Duration>,
  /// Age after which a hit is served but refreshed in the background
  pub stale_after: Option<Duration>,
  /// Skip the cache and always call the producer
  pub force: bool,
}

impl CacheOptions {
  pub fn forced() -> Self {
    Self {
      force: true,
      ..Self::default()
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }

  pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
    self.stale_after = Some(stale_after);
    self
  }
}
