//! Durable, ordered queue of write intents recorded while offline.
//!
//! The queue is a strict FIFO barrier: only the head is ever replayed, and a
//! failed replay leaves it in place so nothing enqueued later can overtake it.

mod handler;
mod mutation_queue;
mod record;

pub use handler::{handler_fn, HandlerRegistry, MutationHandler};
pub use mutation_queue::{FlushReport, MutationQueue, StallListener, DEFAULT_MAX_TRIES, QUEUE_KEY};
pub use record::{MutationRecord, MutationType};
