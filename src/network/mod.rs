//! Connectivity tracking with a one-shot reconnect edge.

mod probe;

pub use probe::HttpProbe;

use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Platform connectivity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
  Connected,
  Disconnected,
  /// The platform could not tell; treated as disconnected
  Unknown,
}

/// Observed network state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkState {
  pub is_connected: bool,
  /// True only on the observation that moved from disconnected to connected
  pub was_offline: bool,
}

/// Something to poke when connectivity returns.
///
/// Implementations must not block: the monitor calls this from its event loop.
pub trait ReconnectHook: Send + Sync {
  fn on_reconnect(&self);
}

impl<F> ReconnectHook for F
where
  F: Fn() + Send + Sync,
{
  fn on_reconnect(&self) {
    self()
  }
}

/// Tracks connectivity and fires the reconnect hook on each real reconnect.
///
/// The edge detector's memory lives outside the published `watch` state so
/// updating it never wakes subscribers on its own.
pub struct NetworkMonitor {
  state_tx: watch::Sender<NetworkState>,
  previously_connected: AtomicBool,
  on_reconnect: Option<Arc<dyn ReconnectHook>>,
}

impl NetworkMonitor {
  pub fn new(initially_connected: bool) -> Self {
    let (state_tx, _) = watch::channel(NetworkState {
      is_connected: initially_connected,
      was_offline: false,
    });
    Self {
      state_tx,
      previously_connected: AtomicBool::new(initially_connected),
      on_reconnect: None,
    }
  }

  pub fn with_reconnect_hook(mut self, hook: Arc<dyn ReconnectHook>) -> Self {
    self.on_reconnect = Some(hook);
    self
  }

  /// Receiver for state changes.
  pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
    self.state_tx.subscribe()
  }

  pub fn state(&self) -> NetworkState {
    *self.state_tx.borrow()
  }

  pub fn is_connected(&self) -> bool {
    self.state().is_connected
  }

  /// Apply one connectivity event and return the resulting state.
  pub fn handle(&self, signal: Reachability) -> NetworkState {
    let is_connected = signal == Reachability::Connected;
    // compute the edge and record the new marker in one step
    let previously = self.previously_connected.swap(is_connected, Ordering::SeqCst);
    let state = NetworkState {
      is_connected,
      was_offline: !previously && is_connected,
    };

    self.state_tx.send_if_modified(|current| {
      if *current != state {
        *current = state;
        true
      } else {
        false
      }
    });

    if state.was_offline {
      info!("Network reconnected, triggering sync");
      if let Some(hook) = &self.on_reconnect {
        hook.on_reconnect();
      }
    } else if previously && !is_connected {
      info!(?signal, "Network lost");
    } else {
      debug!(?signal, "Network state unchanged");
    }

    state
  }

  /// Consume connectivity events until the source ends.
  pub async fn run<St>(&self, events: St)
  where
    St: Stream<Item = Reachability>,
  {
    futures::pin_mut!(events);
    while let Some(signal) = events.next().await {
      self.handle(signal);
    }
    debug!("Connectivity source closed");
  }
}

/// Adapt a channel fed by the platform's connectivity callback into a stream.
pub fn receiver_stream(rx: mpsc::Receiver<Reachability>) -> impl Stream<Item = Reachability> {
  futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|signal| (signal, rx)) })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  fn counting_monitor(initially_connected: bool) -> (NetworkMonitor, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let hook_count = count.clone();
    let monitor = NetworkMonitor::new(initially_connected).with_reconnect_hook(Arc::new(move || {
      hook_count.fetch_add(1, Ordering::SeqCst);
    }));
    (monitor, count)
  }

  #[test]
  fn test_reconnect_edge_fires_once() {
    let (monitor, count) = counting_monitor(false);

    let state = monitor.handle(Reachability::Connected);
    assert_eq!(state, NetworkState { is_connected: true, was_offline: true });

    let state = monitor.handle(Reachability::Connected);
    assert_eq!(state, NetworkState { is_connected: true, was_offline: false });

    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_unknown_counts_as_disconnected() {
    let (monitor, count) = counting_monitor(true);

    let state = monitor.handle(Reachability::Unknown);
    assert!(!state.is_connected);

    monitor.handle(Reachability::Connected);
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_flapping_triggers_once_per_reconnect() {
    let (monitor, count) = counting_monitor(true);

    for signal in [
      Reachability::Disconnected,
      Reachability::Connected,
      Reachability::Disconnected,
      Reachability::Disconnected,
      Reachability::Connected,
      Reachability::Connected,
    ] {
      monitor.handle(signal);
    }

    assert_eq!(count.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_initially_connected_does_not_trigger() {
    let (monitor, count) = counting_monitor(true);
    monitor.handle(Reachability::Connected);
    assert_eq!(count.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_run_consumes_channel_and_publishes_state() {
    let (monitor, count) = counting_monitor(false);
    let mut rx_state = monitor.subscribe();
    let (tx, rx) = mpsc::channel(8);

    tx.send(Reachability::Disconnected).await.unwrap();
    tx.send(Reachability::Connected).await.unwrap();
    drop(tx);

    monitor.run(receiver_stream(rx)).await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(rx_state.has_changed().unwrap());
    assert!(rx_state.borrow_and_update().is_connected);
    assert!(monitor.is_connected());
  }
}
