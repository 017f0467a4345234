//! Cache layer that orchestrates caching logic with network fetching.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::traits::{CacheEntry, CacheOptions, CacheResult};
use crate::clock::{Clock, SystemClock};
use crate::store::KeyValueStore;

/// Cache layer that manages freshness and network fetching.
///
/// This layer sits between the data-access facades and the network client,
/// providing transparent caching with offline support.
pub struct CacheLayer<S: KeyValueStore> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> CacheLayer<S> {
  /// Create a new cache layer over a (possibly shared) store.
  pub fn new(storage: Arc<S>) -> Self {
    Self {
      storage,
      clock: Arc::new(SystemClock),
    }
  }

  /// Replace the time source.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Return the cached value only if it is present, unexpired and of the
  /// expected version. Absent and expired are indistinguishable here.
  pub async fn get_cached<T>(&self, key: &str, opts: &CacheOptions) -> Result<Option<T>>
  where
    T: DeserializeOwned,
  {
    let now = self.clock.now_ms();
    Ok(
      self
        .get_cached_entry::<T>(key, opts)
        .await?
        .filter(|entry| entry.is_fresh_at(now, opts.version.as_deref()))
        .map(|entry| entry.value),
    )
  }

  /// Return the raw entry with its timestamps, fresh or not.
  pub async fn get_cached_entry<T>(
    &self,
    key: &str,
    opts: &CacheOptions,
  ) -> Result<Option<CacheEntry<T>>>
  where
    T: DeserializeOwned,
  {
    let store_key = opts.store_key(key);
    let Some(raw) = self.storage.get(&store_key).await? else {
      return Ok(None);
    };

    match serde_json::from_value::<CacheEntry<T>>(raw) {
      Ok(entry) => Ok(Some(entry)),
      Err(e) => {
        warn!(key = %store_key, error = %e, "Cache entry has unexpected shape, treating as miss");
        Ok(None)
      }
    }
  }

  /// Write a value through to the store with `expires_at = now + ttl_ms`.
  pub async fn set_cached<T>(&self, key: &str, value: &T, opts: &CacheOptions) -> Result<()>
  where
    T: Serialize,
  {
    let entry = CacheEntry::new(value, self.clock.now_ms(), opts.ttl_ms, opts.version.clone());
    let json =
      serde_json::to_value(&entry).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))?;

    self.storage.set(&opts.store_key(key), &json).await
  }

  /// Explicitly invalidate a key so the next read refetches.
  pub async fn clear_cached(&self, key: &str, opts: &CacheOptions) -> Result<()> {
    self.storage.remove(&opts.store_key(key)).await
  }

  /// Drop every entry under a prefix.
  pub async fn clear_all(&self, opts: &CacheOptions) -> Result<usize> {
    self.storage.clear_prefix(&opts.key_prefix).await
  }

  /// Fetch with cache-first strategy, returning only the data.
  pub async fn fetch_with_cache<T, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
    opts: &CacheOptions,
  ) -> Result<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    Ok(self.fetch_with_cache_result(key, fetcher, opts).await?.data)
  }

  /// Fetch with cache-first strategy, reporting provenance.
  ///
  /// 1. Check cache - if fresh and the version matches, return immediately
  /// 2. Otherwise fetch from network and write the result through
  /// 3. On network failure, return any existing entry (offline mode) if allowed
  /// 4. With nothing to fall back on, propagate the fetcher's error
  pub async fn fetch_with_cache_result<T, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
    opts: &CacheOptions,
  ) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    // an unreadable store degrades to a miss; only the fetcher's error escapes
    let existing = match self.get_cached_entry::<T>(key, opts).await {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "Cache read failed, fetching from network");
        None
      }
    };

    let now = self.clock.now_ms();
    let existing = match existing {
      Some(entry) if entry.is_fresh_at(now, opts.version.as_deref()) => {
        debug!(key, "Cache hit");
        return Ok(CacheResult::from_cache(entry.value));
      }
      other => other,
    };

    match fetcher().await {
      Ok(data) => {
        // A failed write-through must not turn a successful fetch into an error
        if let Err(e) = self.set_cached(key, &data, opts).await {
          warn!(key, error = %e, "Failed to write fetched value to cache");
        }
        Ok(CacheResult::from_network(data))
      }
      Err(err) => match existing {
        Some(entry) if opts.allow_stale_on_error => {
          warn!(key, error = %err, "Fetch failed, serving cached value");
          Ok(CacheResult::stale(entry.value))
        }
        _ => Err(err),
      },
    }
  }
}

impl<S: KeyValueStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      clock: Arc::clone(&self.clock),
    }
  }
}
