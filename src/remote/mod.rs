//! REST collaborators and the data-access facade built on the cache and queue.

mod cache;
mod cached_client;
mod client;
pub mod types;

pub use cache::ContentQuery;
pub use cached_client::{replay_handlers, CachedContentClient, WriteOutcome};
pub use client::{ApiClient, ContentApi};
