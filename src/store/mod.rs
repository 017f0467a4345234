//! Durable key-value storage shared by the cache and the mutation queue.
//!
//! Everything persisted by this crate lives in one string-keyed namespace:
//! - cache entries under `<prefix><cacheKey>`, one JSON `CacheEntry` each
//! - the mutation queue under a single fixed key holding a JSON array
//!
//! Stores are last-write-wins per key and offer no transactions.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::KeyValueStore;
