//! The persisted mutation queue and its drain loop.

use color_eyre::{eyre::eyre, Report, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::handler::HandlerRegistry;
use super::record::{MutationRecord, MutationType};
use crate::clock::{Clock, SystemClock};
use crate::store::KeyValueStore;

/// Well-known store key holding the JSON array of pending records.
pub const QUEUE_KEY: &str = "offline:mutationQueue";

/// Iteration bound for one `flush_all` call.
pub const DEFAULT_MAX_TRIES: usize = 100;

/// Called with the head record and the error whenever a replay fails.
///
/// The record stays queued; this is the hook for surfacing a stuck write or
/// reverting optimistic UI state. It runs while the drain holds the queue, so
/// a listener that wants the record gone must hand the id to a task that
/// calls `MutationQueue::discard`.
pub type StallListener = Arc<dyn Fn(&MutationRecord, &Report) + Send + Sync>;

/// Summary of one `flush_all` invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
  /// Records replayed and removed
  pub replayed: usize,
  /// Records still queued afterwards
  pub remaining: usize,
  /// Head record that failed and stopped the drain, if any
  pub blocked_on: Option<MutationRecord>,
}

enum HeadOutcome {
  Empty,
  Replayed,
  Failed(MutationRecord),
}

/// Ordered, durable list of pending write intents.
///
/// Two locks serialize access:
/// - `list_lock` guards every read-modify-write of the stored list, so
///   concurrent enqueues cannot drop an append
/// - `flush_lock` admits one drainer at a time and is held across the remote
///   call, so the head is never dispatched twice concurrently
///
/// Enqueues only wait on `list_lock` and proceed while a replay is in flight.
pub struct MutationQueue<S: KeyValueStore> {
  storage: Arc<S>,
  handlers: HandlerRegistry,
  clock: Arc<dyn Clock>,
  key: String,
  list_lock: Mutex<()>,
  flush_lock: Mutex<()>,
  on_stall: Option<StallListener>,
}

impl<S: KeyValueStore> MutationQueue<S> {
  pub fn new(storage: Arc<S>, handlers: HandlerRegistry) -> Self {
    Self {
      storage,
      handlers,
      clock: Arc::new(SystemClock),
      key: QUEUE_KEY.to_string(),
      list_lock: Mutex::new(()),
      flush_lock: Mutex::new(()),
      on_stall: None,
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Store the queue under a different key.
  pub fn with_key(mut self, key: impl Into<String>) -> Self {
    self.key = key.into();
    self
  }

  pub fn with_stall_listener(mut self, listener: StallListener) -> Self {
    self.on_stall = Some(listener);
    self
  }

  /// Append a new intent to the tail and persist the list.
  pub async fn enqueue(&self, kind: MutationType, payload: Value) -> Result<MutationRecord> {
    let record = MutationRecord::new(kind, payload, self.clock.now_ms());

    let _guard = self.list_lock.lock().await;
    let mut list = self.load().await?;
    list.push(record.clone());
    self.save(&list).await?;

    debug!(id = %record.id, kind = %record.kind, pending = list.len(), "Enqueued mutation");
    Ok(record)
  }

  /// Replay the head record once.
  ///
  /// Returns `true` when the queue is empty or the head was replayed and
  /// removed, `false` when the head failed and was left in place.
  pub async fn flush_once(&self) -> Result<bool> {
    let _flush = self.flush_lock.lock().await;
    Ok(!matches!(self.flush_head().await?, HeadOutcome::Failed(_)))
  }

  /// Drain the queue until it is empty, the head fails, or `max_tries`
  /// iterations have run.
  ///
  /// A failing head is never dropped; it is retried on the next call.
  pub async fn flush_all(&self, max_tries: usize) -> Result<FlushReport> {
    let _flush = self.flush_lock.lock().await;
    let mut report = FlushReport::default();

    for _ in 0..max_tries {
      match self.flush_head().await? {
        HeadOutcome::Empty => break,
        HeadOutcome::Replayed => report.replayed += 1,
        HeadOutcome::Failed(record) => {
          report.blocked_on = Some(record);
          break;
        }
      }
    }

    report.remaining = self.size().await?;
    if report.replayed > 0 || report.blocked_on.is_some() {
      info!(
        replayed = report.replayed,
        remaining = report.remaining,
        blocked = report.blocked_on.is_some(),
        "Flushed mutation queue"
      );
    }
    Ok(report)
  }

  /// Number of pending records, for the "pending sync" badge.
  pub async fn size(&self) -> Result<usize> {
    Ok(self.pending().await?.len())
  }

  /// Remove one record by id, wherever it sits in the queue.
  ///
  /// This is the way out for a head that can never succeed (an unknown type,
  /// a payload the server rejects). Waits for any in-flight drain to finish,
  /// so it must not be awaited from inside a `StallListener`.
  pub async fn discard(&self, id: &str) -> Result<Option<MutationRecord>> {
    let _flush = self.flush_lock.lock().await;
    let _guard = self.list_lock.lock().await;

    let mut list = self.load().await?;
    let Some(pos) = list.iter().position(|r| r.id == id) else {
      return Ok(None);
    };
    let record = list.remove(pos);
    self.save(&list).await?;

    info!(id = %record.id, kind = %record.kind, pending = list.len(), "Discarded mutation");
    Ok(Some(record))
  }

  /// Snapshot of the pending records in delivery order.
  pub async fn pending(&self) -> Result<Vec<MutationRecord>> {
    let _guard = self.list_lock.lock().await;
    self.load().await
  }

  /// Caller must hold `flush_lock`.
  async fn flush_head(&self) -> Result<HeadOutcome> {
    let head = {
      let _guard = self.list_lock.lock().await;
      match self.load().await?.into_iter().next() {
        Some(head) => head,
        None => return Ok(HeadOutcome::Empty),
      }
    };

    let result = match self.handlers.get(&head.kind) {
      Some(handler) => handler.replay(&head.payload).await,
      None => Err(eyre!("No handler registered for mutation type {}", head.kind)),
    };

    if let Err(e) = result {
      warn!(id = %head.id, kind = %head.kind, error = %e, "Mutation replay failed, keeping at head");
      if let Some(listener) = &self.on_stall {
        listener(&head, &e);
      }
      return Ok(HeadOutcome::Failed(head));
    }

    // Enqueues may have appended meanwhile; only flushers remove, so the
    // head is still ours.
    let _guard = self.list_lock.lock().await;
    let mut list = self.load().await?;
    if list.first().map(|r| r.id.as_str()) == Some(head.id.as_str()) {
      list.remove(0);
      self.save(&list).await?;
    } else {
      warn!(id = %head.id, "Replayed head no longer at front of queue");
    }

    debug!(id = %head.id, kind = %head.kind, pending = list.len(), "Replayed mutation");
    Ok(HeadOutcome::Replayed)
  }

  async fn load(&self) -> Result<Vec<MutationRecord>> {
    let Some(raw) = self.storage.get(&self.key).await? else {
      return Ok(Vec::new());
    };

    match serde_json::from_value(raw) {
      Ok(list) => Ok(list),
      Err(e) => {
        warn!(key = %self.key, error = %e, "Mutation queue is corrupt, treating as empty");
        Ok(Vec::new())
      }
    }
  }

  async fn save(&self, list: &[MutationRecord]) -> Result<()> {
    let value =
      serde_json::to_value(list).map_err(|e| eyre!("Failed to serialize mutation queue: {}", e))?;
    self.storage.set(&self.key, &value).await
  }
}
