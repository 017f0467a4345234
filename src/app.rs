//! Wiring of store, cache, queue, monitor and sync loop for a long-running
//! process.

use color_eyre::{Report, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::CacheLayer;
use crate::config::Config;
use crate::network::{receiver_stream, HttpProbe, NetworkMonitor};
use crate::queue::{MutationQueue, MutationRecord, StallListener};
use crate::remote::{replay_handlers, ApiClient, CachedContentClient};
use crate::store::SqliteStore;
use crate::sync::SyncOrchestrator;

/// Fully wired data-access stack over the SQLite store.
pub struct App {
  config: Config,
  api: Arc<ApiClient>,
  queue: Arc<MutationQueue<SqliteStore>>,
  client: CachedContentClient<SqliteStore, ApiClient>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let store = Arc::new(SqliteStore::open_at(&config.store_path()?)?);
    debug!(path = %store.path().display(), "Opened store");
    let api = Arc::new(ApiClient::new(&config.api)?);

    let on_stall: StallListener = Arc::new(|record: &MutationRecord, err: &Report| {
      warn!(id = %record.id, kind = %record.kind, error = %err, "Pending write is blocking the queue");
    });
    let queue = Arc::new(
      MutationQueue::new(Arc::clone(&store), replay_handlers(Arc::clone(&api)))
        .with_stall_listener(on_stall),
    );

    let client = CachedContentClient::new(
      Arc::clone(&api),
      CacheLayer::new(store),
      Arc::clone(&queue),
      config.cache.clone(),
    );

    Ok(Self {
      config,
      api,
      queue,
      client,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn client(&self) -> &CachedContentClient<SqliteStore, ApiClient> {
    &self.client
  }

  pub fn queue(&self) -> &Arc<MutationQueue<SqliteStore>> {
    &self.queue
  }

  /// Health probe against the configured service.
  pub fn probe(&self) -> Result<HttpProbe> {
    HttpProbe::new(
      self.api.base_url(),
      self.config.sync.probe_interval(),
      Duration::from_secs(self.config.api.timeout_secs),
    )
  }

  /// Run the sync loop and connectivity monitor until `shutdown` resolves.
  pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
  where
    F: Future<Output = ()>,
  {
    let (sync, sync_task) =
      SyncOrchestrator::new(Arc::clone(&self.queue), self.config.sync.interval())
        .with_max_tries(self.config.sync.max_tries)
        .start();

    // unknown until the first probe answers
    let monitor =
      Arc::new(NetworkMonitor::new(false).with_reconnect_hook(Arc::new(sync.clone())));
    let (tx, rx) = mpsc::channel(16);
    let probe_task = self.probe()?.spawn(tx);
    let monitor_task = {
      let monitor = Arc::clone(&monitor);
      tokio::spawn(async move { monitor.run(receiver_stream(rx)).await })
    };

    info!(
      base_url = %self.api.base_url(),
      interval_secs = self.config.sync.interval_secs,
      "Sync service started"
    );

    let mut states = monitor.subscribe();
    let mut reports = sync.reports();
    tokio::pin!(shutdown);

    loop {
      tokio::select! {
        _ = &mut shutdown => break,
        Ok(()) = states.changed() => {
          let state = *states.borrow_and_update();
          info!(connected = state.is_connected, "Connectivity changed");
        }
        Ok(()) = reports.changed() => {
          if let Some(report) = reports.borrow_and_update().clone() {
            if let Some(blocked) = &report.blocked_on {
              warn!(id = %blocked.id, remaining = report.remaining, "Sync stalled");
            }
          }
        }
      }
    }

    info!("Shutting down sync service");
    probe_task.abort();
    monitor_task.abort();
    sync.shutdown();
    if let Err(e) = sync_task.await {
      warn!(error = %e, "Sync task ended abnormally");
    }

    Ok(())
  }
}
