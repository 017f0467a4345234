//! In-process store used by tests and ephemeral sessions.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::traits::{decode_stored, KeyValueStore};

/// Store that keeps serialized JSON text in memory.
///
/// Values are held as text rather than `Value` so the same decoding path
/// (and corruption handling) applies as for the SQLite backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
  data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store raw text under `key`, bypassing serialization.
  pub fn insert_raw(&self, key: &str, raw: &str) -> Result<()> {
    let mut data = self
      .data
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    data.insert(key.to_string(), raw.to_string());
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.data.lock().map(|d| d.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<Value>> {
    let data = self
      .data
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(data.get(key).and_then(|raw| decode_stored(key, raw)))
  }

  async fn set(&self, key: &str, value: &Value) -> Result<()> {
    let raw =
      serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize value: {}", e))?;
    self.insert_raw(key, &raw)
  }

  async fn remove(&self, key: &str) -> Result<()> {
    let mut data = self
      .data
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    data.remove(key);
    Ok(())
  }

  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let data = self
      .data
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      data
        .range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect(),
    )
  }
}
