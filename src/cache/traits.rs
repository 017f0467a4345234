//! Core types for the caching system.

use serde::{Deserialize, Serialize};

/// Namespace prepended to cache keys when the caller does not pick one.
pub const DEFAULT_KEY_PREFIX: &str = "cache:";

/// A stored cache entry.
///
/// Entries are never mutated in place; a successful fetch overwrites the
/// whole entry under the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub value: T,
  /// Milliseconds since epoch when the value was cached
  pub created_at: i64,
  /// Always `created_at + ttl_ms`
  pub expires_at: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

impl<T> CacheEntry<T> {
  pub fn new(value: T, now_ms: i64, ttl_ms: i64, version: Option<String>) -> Self {
    Self {
      value,
      created_at: now_ms,
      expires_at: now_ms.saturating_add(ttl_ms),
      version,
    }
  }

  /// Whether the entry has passed its expiry at `now_ms`.
  pub fn is_stale_at(&self, now_ms: i64) -> bool {
    now_ms >= self.expires_at
  }

  /// Whether the entry satisfies an expected version.
  ///
  /// A caller that expects no particular version accepts any entry.
  pub fn matches_version(&self, expected: Option<&str>) -> bool {
    match expected {
      Some(v) => self.version.as_deref() == Some(v),
      None => true,
    }
  }

  /// Fresh means unexpired and version-compatible.
  pub fn is_fresh_at(&self, now_ms: i64, expected_version: Option<&str>) -> bool {
    !self.is_stale_at(now_ms) && self.matches_version(expected_version)
  }
}

/// Per-call cache policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
  /// Time to live in milliseconds; zero or negative means immediately expired
  pub ttl_ms: i64,
  /// Expected schema version; entries with another version are misses
  pub version: Option<String>,
  /// Serve an existing entry when the fetcher fails
  pub allow_stale_on_error: bool,
  pub key_prefix: String,
}

impl CacheOptions {
  pub fn new(ttl_ms: i64) -> Self {
    Self {
      ttl_ms,
      version: None,
      allow_stale_on_error: true,
      key_prefix: DEFAULT_KEY_PREFIX.to_string(),
    }
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = Some(version.into());
    self
  }

  pub fn with_allow_stale_on_error(mut self, allow: bool) -> Self {
    self.allow_stale_on_error = allow;
    self
  }

  pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.key_prefix = prefix.into();
    self
  }

  /// Full store key for a cache key under this policy's prefix.
  pub fn store_key(&self, key: &str) -> String {
    format!("{}{}", self.key_prefix, key)
  }
}

impl Default for CacheOptions {
  fn default() -> Self {
    // five minutes
    Self::new(5 * 60 * 1000)
  }
}

/// Result from a cache operation, including where the data came from.
///
/// This is the shape screens bind against to render a "from cache" or
/// "stale, offline" banner.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Data was served from the store rather than the network
  pub is_from_cache: bool,
  /// Data is a fallback served because the network fetch failed
  pub is_stale: bool,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      is_from_cache: false,
      is_stale: false,
    }
  }

  /// A fresh cache hit.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      is_from_cache: true,
      is_stale: false,
    }
  }

  /// Offline mode - network failed, serving whatever was cached.
  pub fn stale(data: T) -> Self {
    Self {
      data,
      is_from_cache: true,
      is_stale: true,
    }
  }
}
