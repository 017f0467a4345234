//! Store trait and the shared JSON decoding policy.

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;
use tracing::warn;

/// Trait for durable key-value backends.
///
/// Every call is independently durable. Concurrent `set`s to the same key
/// resolve last-write-wins; callers needing read-modify-write atomicity must
/// provide their own exclusion.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  /// Read a value. Missing keys and unparseable stored text both yield `None`.
  async fn get(&self, key: &str) -> Result<Option<Value>>;

  /// Write a value, replacing any previous one.
  async fn set(&self, key: &str, value: &Value) -> Result<()>;

  /// Delete a key. Removing an absent key is not an error.
  async fn remove(&self, key: &str) -> Result<()>;

  /// List keys starting with `prefix`, sorted.
  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

  /// Remove every key starting with `prefix`, returning how many were removed.
  async fn clear_prefix(&self, prefix: &str) -> Result<usize> {
    let keys = self.keys_with_prefix(prefix).await?;
    for key in &keys {
      self.remove(key).await?;
    }
    Ok(keys.len())
  }
}

/// Decode stored text, degrading corruption to "absent".
///
/// The read path must never fail on a bad row, but the loss is logged so it
/// can be diagnosed.
pub(crate) fn decode_stored(key: &str, raw: &str) -> Option<Value> {
  match serde_json::from_str(raw) {
    Ok(value) => Some(value),
    Err(e) => {
      warn!(key, error = %e, "Discarding corrupt stored value");
      None
    }
  }
}
