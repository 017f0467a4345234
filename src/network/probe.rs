//! HTTP reachability probe for hosts without a native connectivity callback.

use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use super::Reachability;

/// Polls the service health endpoint and reports reachability.
#[derive(Clone)]
pub struct HttpProbe {
  client: reqwest::Client,
  url: Url,
  interval: Duration,
}

impl HttpProbe {
  pub fn new(base_url: &Url, interval: Duration, timeout: Duration) -> Result<Self> {
    let url = base_url
      .join("health")
      .map_err(|e| eyre!("Invalid health URL for {}: {}", base_url, e))?;
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      client,
      url,
      interval,
    })
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Single check. Any transport error or non-success status is "disconnected".
  pub async fn check(&self) -> Reachability {
    match self.client.get(self.url.clone()).send().await {
      Ok(resp) if resp.status().is_success() => Reachability::Connected,
      Ok(resp) => {
        debug!(status = %resp.status(), "Health check returned error status");
        Reachability::Disconnected
      }
      Err(e) => {
        debug!(error = %e, "Health check failed");
        Reachability::Disconnected
      }
    }
  }

  /// Probe on a fixed interval, feeding results into `tx` until the
  /// receiver is dropped.
  pub fn spawn(self, tx: mpsc::Sender<Reachability>) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let signal = self.check().await;
        if tx.send(signal).await.is_err() {
          break;
        }
      }
    })
  }
}
