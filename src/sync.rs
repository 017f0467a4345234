//! Background loop that drains the mutation queue.
//!
//! Two triggers converge on `flush_all`: a fixed-interval timer and explicit
//! requests (reconnect edges, user pull-to-refresh). The loop runs flushes
//! one at a time; the queue's own locks cover callers that flush directly.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::network::ReconnectHook;
use crate::queue::{FlushReport, MutationQueue, DEFAULT_MAX_TRIES};
use crate::store::KeyValueStore;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Why a flush ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
  Timer,
  Reconnect,
  Manual,
}

impl fmt::Display for SyncReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Timer => write!(f, "timer"),
      Self::Reconnect => write!(f, "reconnect"),
      Self::Manual => write!(f, "manual"),
    }
  }
}

#[derive(Debug)]
enum Command {
  Flush(SyncReason),
  Shutdown,
}

/// Periodic / on-demand queue drainer.
pub struct SyncOrchestrator<S: KeyValueStore + 'static> {
  queue: Arc<MutationQueue<S>>,
  interval: Duration,
  max_tries: usize,
}

impl<S: KeyValueStore + 'static> SyncOrchestrator<S> {
  /// `interval` is clamped to at least one millisecond.
  pub fn new(queue: Arc<MutationQueue<S>>, interval: Duration) -> Self {
    Self {
      queue,
      interval: interval.max(MIN_INTERVAL),
      max_tries: DEFAULT_MAX_TRIES,
    }
  }

  pub fn with_max_tries(mut self, max_tries: usize) -> Self {
    self.max_tries = max_tries;
    self
  }

  /// Spawn the loop. The first timer tick fires immediately, so anything
  /// left over from a previous session is retried at startup.
  ///
  /// The loop stops on `SyncHandle::shutdown` or when every handle is dropped.
  pub fn start(self) -> (SyncHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (report_tx, report_rx) = watch::channel(None);

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

      loop {
        let reason = tokio::select! {
          _ = ticker.tick() => SyncReason::Timer,
          cmd = rx.recv() => match cmd {
            Some(Command::Flush(reason)) => reason,
            Some(Command::Shutdown) | None => break,
          },
        };

        if let Some(report) = self.flush(reason).await {
          report_tx.send_replace(Some(report));
        }
      }
      debug!("Sync loop stopped");
    });

    (
      SyncHandle {
        tx,
        reports: report_rx,
      },
      task,
    )
  }

  async fn flush(&self, reason: SyncReason) -> Option<FlushReport> {
    match self.queue.flush_all(self.max_tries).await {
      Ok(report) => {
        debug!(%reason, replayed = report.replayed, remaining = report.remaining, "Sync pass done");
        Some(report)
      }
      Err(e) => {
        // contained: the next trigger retries
        warn!(%reason, error = %e, "Sync pass failed");
        None
      }
    }
  }
}

/// Cheap, cloneable control handle for a running orchestrator.
#[derive(Clone)]
pub struct SyncHandle {
  tx: mpsc::UnboundedSender<Command>,
  reports: watch::Receiver<Option<FlushReport>>,
}

impl SyncHandle {
  /// Request a flush without waiting for it.
  pub fn trigger(&self, reason: SyncReason) {
    if self.tx.send(Command::Flush(reason)).is_err() {
      debug!(%reason, "Sync loop not running, trigger dropped");
    }
  }

  pub fn shutdown(&self) {
    let _ = self.tx.send(Command::Shutdown);
  }

  /// Receiver for the report of each completed flush.
  pub fn reports(&self) -> watch::Receiver<Option<FlushReport>> {
    self.reports.clone()
  }
}

impl ReconnectHook for SyncHandle {
  fn on_reconnect(&self) {
    self.trigger(SyncReason::Reconnect);
  }
}
