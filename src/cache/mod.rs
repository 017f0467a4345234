//! Time-bounded cache over the durable store, with offline fallback.
//!
//! This module provides a content-agnostic caching mechanism that:
//! - Stores one JSON `CacheEntry` per key with a TTL-derived expiry
//! - Treats a version mismatch as a miss, so a schema bump invalidates old entries
//! - Serves a stale entry when the network fetch fails (offline mode)
//! - Reports provenance (`is_from_cache`, `is_stale`) for "offline" banners

mod key;
mod layer;
mod traits;

pub use key::{canonical_json, make_cache_key};
pub use layer::CacheLayer;
pub use traits::{CacheEntry, CacheOptions, CacheResult, DEFAULT_KEY_PREFIX};
