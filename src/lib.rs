//! Offline-resilient data access for the Noor daily-life client.
//!
//! Reads go through a TTL cache that falls back to stale data when the
//! network fails; writes that fail are recorded in a durable FIFO queue and
//! replayed when connectivity returns.
//!
//! ```ignore
//! let store = Arc::new(SqliteStore::open()?);
//! let api = Arc::new(ApiClient::new(&config.api)?);
//! let queue = Arc::new(MutationQueue::new(store.clone(), replay_handlers(api.clone())));
//! let client = CachedContentClient::new(api, CacheLayer::new(store), queue.clone(), config.cache);
//!
//! let (sync, _task) = SyncOrchestrator::new(queue, config.sync.interval()).start();
//! let monitor = NetworkMonitor::new(false).with_reconnect_hook(Arc::new(sync));
//!
//! let surahs = client.surahs().await?;
//! if surahs.is_stale {
//!   // show "offline, data may be outdated"
//! }
//! ```

pub mod app;
pub mod cache;
pub mod clock;
pub mod config;
pub mod network;
pub mod queue;
pub mod remote;
pub mod store;
pub mod sync;

pub use cache::{make_cache_key, CacheEntry, CacheLayer, CacheOptions, CacheResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use network::{NetworkMonitor, NetworkState, Reachability, ReconnectHook};
pub use queue::{
  FlushReport, HandlerRegistry, MutationHandler, MutationQueue, MutationRecord, MutationType,
};
pub use remote::{ApiClient, CachedContentClient, ContentApi, WriteOutcome};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{SyncHandle, SyncOrchestrator, SyncReason};
