//! Keyed, TTL-bounded memoization of async producers.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::traits::{CacheOptions, CacheResult};
use crate::api::ApiError;

type Flight<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub key: String,
  pub value: V,
  pub stored_at: Instant,
  pub cached_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
  fn new(key: String, value: V) -> Self {
    Self {
      key,
      value,
      stored_at: Instant::now(),
      cached_at: Utc::now(),
    }
  }

  fn age(&self, now: Instant) -> Duration {
    now.saturating_duration_since(self.stored_at)
  }
}

struct Slot<V> {
  entry: Option<CacheEntry<V>>,
  flight: Option<(u64, Flight<V>)>,
}

impl<V> Default for Slot<V> {
  fn default() -> Self {
    Self {
      entry: None,
      flight: None,
    }
  }
}

type Slots<V> = Arc<Mutex<HashMap<String, Slot<V>>>>;

/// In-memory cache with at most one in-flight producer per key.
///
/// A producer's result is written back only if its flight is still the
/// current one for the key, so `invalidate` detaches work already running.
pub struct CacheLayer<V> {
  slots: Slots<V>,
  ttl: Duration,
  next_flight: Arc<AtomicU64>,
}

impl<V> Clone for CacheLayer<V> {
  fn clone(&self) -> Self {
    Self {
      slots: Arc::clone(&self.slots),
      ttl: self.ttl,
      next_flight: Arc::clone(&self.next_flight),
    }
  }
}

impl<V: Clone + Send + Sync + 'static> CacheLayer<V> {
  pub fn new(ttl: Duration) -> Self {
    Self {
      slots: Arc::new(Mutex::new(HashMap::new())),
      ttl,
      next_flight: Arc::new(AtomicU64::new(0)),
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  /// Return the cached value for `key`, or run `producer` to get one.
  ///
  /// - fresh hit: returned as is
  /// - hit older than `stale_after` but within ttl: returned, and one
  ///   background refresh is started
  /// - expired, missing or `force`: `producer` runs (or an in-flight run
  ///   for the same key is joined)
  ///
  /// A failed producer leaves the previous entry in place.
  pub async fn get<F, Fut>(
    &self,
    key: &str,
    producer: F,
    options: CacheOptions,
  ) -> Result<CacheResult<V>, ApiError>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
  {
    let ttl = options.ttl.unwrap_or(self.ttl);
    let now = Instant::now();

    let flight = {
      let mut slots = self.lock();
      let slot = slots.entry(key.to_string()).or_default();

      if !options.force {
        if let Some(entry) = &slot.entry {
          let age = entry.age(now);
          if age <= ttl {
            let stale = options.stale_after.is_some_and(|after| age > after);
            let hit = CacheResult::from_cache(entry.value.clone(), entry.cached_at, stale);
            if stale && slot.flight.is_none() {
              debug!(key, age_ms = age.as_millis() as u64, "serving stale entry, refreshing");
              let flight = self.start_flight(slot, key, producer);
              tokio::spawn(async move {
                if let Err(e) = flight.await {
                  warn!(error = %e, "background refresh failed");
                }
              });
            }
            return Ok(hit);
          }
        }
      }

      match &slot.flight {
        Some((_, flight)) if !options.force => flight.clone(),
        _ => self.start_flight(slot, key, producer),
      }
    };

    flight.await.map(CacheResult::from_network)
  }

  /// Drop the entry for `key` and detach any in-flight producer.
  pub fn invalidate(&self, key: &str) {
    if self.lock().remove(key).is_some() {
      debug!(key, "cache entry invalidated");
    }
  }

  pub fn invalidate_all(&self) {
    self.lock().clear();
  }

  /// Whether an entry is stored for `key`, regardless of age.
  pub fn contains(&self, key: &str) -> bool {
    self
      .lock()
      .get(key)
      .is_some_and(|slot| slot.entry.is_some())
  }

  /// The stored entry for `key`, if any.
  pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
    self.lock().get(key).and_then(|slot| slot.entry.clone())
  }

  /// Register a new flight for `key`. The returned future is lazy; whoever
  /// awaits it first drives the producer.
  fn start_flight<F, Fut>(&self, slot: &mut Slot<V>, key: &str, producer: F) -> Flight<V>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
  {
    let id = self.next_flight.fetch_add(1, Ordering::SeqCst);
    let slots = Arc::clone(&self.slots);
    let key = key.to_string();

    let flight = async move {
      let result = producer().await;

      let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
      if let Some(slot) = slots.get_mut(&key) {
        if slot.flight.as_ref().is_some_and(|(current, _)| *current == id) {
          slot.flight = None;
          if let Ok(value) = &result {
            slot.entry = Some(CacheEntry::new(key.clone(), value.clone()));
          }
        }
      }
      result
    }
    .boxed()
    .shared();

    slot.flight = Some((id, flight.clone()));
    flight
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<V>>> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ErrorKind;
  use crate::cache::CacheSource;
  use std::sync::atomic::AtomicUsize;

  const TTL: Duration = Duration::from_secs(60);

  /// Producer that counts calls and returns the call number after `delay`.
  fn counting(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
  ) -> impl FnOnce() -> BoxFuture<'static, Result<usize, ApiError>> + Send + 'static {
    let calls = Arc::clone(calls);
    move || {
      async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(delay).await;
        Ok(n)
      }
      .boxed()
    }
  }

  fn failing() -> impl FnOnce() -> BoxFuture<'static, Result<usize, ApiError>> + Send + 'static {
    || async { Err(ApiError::new(ErrorKind::ServerError, "boom")) }.boxed()
  }

  #[tokio::test(start_paused = true)]
  async fn test_hit_within_ttl_calls_producer_once() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    let second = cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, 1);
    assert!(second.cached_at.is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_is_refetched() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();
    tokio::time::advance(TTL + Duration::from_millis(1)).await;
    let again = cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();

    assert_eq!(again.data, 2);
    assert_eq!(again.source, CacheSource::Network);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_gets_share_one_flight() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(100);

    let (a, b, c) = tokio::join!(
      cache.get("k", counting(&calls, delay), CacheOptions::default()),
      cache.get("k", counting(&calls, delay), CacheOptions::default()),
      cache.get("k", counting(&calls, delay), CacheOptions::default()),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.unwrap().data, 1);
    assert_eq!(b.unwrap().data, 1);
    assert_eq!(c.unwrap().data, 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_forces_next_get_to_produce() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();
    assert!(cache.contains("k"));
    cache.invalidate("k");
    assert!(!cache.contains("k"));

    let again = cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();
    assert_eq!(again.data, 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidated_flight_is_not_written_back() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));

    let (result, _) = tokio::join!(
      cache.get("k", counting(&calls, Duration::from_millis(100)), CacheOptions::default()),
      async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate("k");
      }
    );

    assert_eq!(result.unwrap().data, 1);
    assert!(!cache.contains("k"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_force_always_produces() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();
    let forced = cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::forced())
      .await
      .unwrap();

    assert_eq!(forced.data, 2);
    assert_eq!(cache.peek("k").map(|e| e.value), Some(2));
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_keeps_previous_entry() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .get("k", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();
    let err = cache
      .get("k", failing(), CacheOptions::forced())
      .await
      .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(cache.peek("k").map(|e| e.value), Some(1));
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_reaches_every_waiter() {
    let cache: CacheLayer<usize> = CacheLayer::new(TTL);
    let slow_failure = || {
      async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err::<usize, _>(ApiError::new(ErrorKind::Timeout, "slow"))
      }
      .boxed()
    };

    let (a, b) = tokio::join!(
      cache.get("k", slow_failure, CacheOptions::default()),
      cache.get("k", failing(), CacheOptions::default()),
    );

    assert_eq!(a.unwrap_err().kind, ErrorKind::Timeout);
    assert_eq!(b.unwrap_err().kind, ErrorKind::Timeout);
    assert!(!cache.contains("k"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_soft_stale_serves_cached_and_refreshes_once() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));
    let options = CacheOptions::default().with_stale_after(Duration::from_secs(10));

    cache
      .get("k", counting(&calls, Duration::ZERO), options)
      .await
      .unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;

    let stale = cache
      .get("k", counting(&calls, Duration::from_millis(100)), options)
      .await
      .unwrap();
    let again = cache
      .get("k", counting(&calls, Duration::from_millis(100)), options)
      .await
      .unwrap();

    assert_eq!(stale.source, CacheSource::CacheStale);
    assert_eq!(stale.data, 1);
    assert_eq!(again.data, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.peek("k").map(|e| e.value), Some(2));
  }

  #[tokio::test(start_paused = true)]
  async fn test_per_call_ttl_overrides_default() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));
    let short = CacheOptions::default().with_ttl(Duration::from_secs(1));

    cache
      .get("k", counting(&calls, Duration::ZERO), short)
      .await
      .unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    let again = cache
      .get("k", counting(&calls, Duration::ZERO), short)
      .await
      .unwrap();

    assert_eq!(again.data, 2);
  }

  #[tokio::test]
  async fn test_invalidate_all_and_keys_are_independent() {
    let cache = CacheLayer::new(TTL);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .get("a", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();
    cache
      .get("b", counting(&calls, Duration::ZERO), CacheOptions::default())
      .await
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    cache.invalidate_all();
    assert!(!cache.contains("a"));
    assert!(!cache.contains("b"));
  }
}
