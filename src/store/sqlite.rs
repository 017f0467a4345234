//! SQLite-backed key-value store.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::traits::{decode_stored, KeyValueStore};

/// SQLite-based durable store.
///
/// Rusqlite is blocking, so every call hops onto the blocking pool and takes
/// the connection lock there.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
  path: PathBuf,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
      }
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Arc::new(Mutex::new(conn)),
      path: path.to_path_buf(),
    };
    store.run_migrations()?;
    debug!(path = %path.display(), "Opened SQLite store");

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("noor-sync").join("store.db"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }

  async fn with_conn<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let conn = conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
      f(&conn)
    })
    .await
    .map_err(|e| eyre!("Store task failed: {}", e))?
  }
}

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

#[async_trait]
impl KeyValueStore for SqliteStore {
  async fn get(&self, key: &str) -> Result<Option<Value>> {
    let owned = key.to_string();
    let raw: Option<String> = self
      .with_conn(move |conn| {
        conn
          .query_row(
            "SELECT value FROM kv_store WHERE key = ?",
            params![owned],
            |row| row.get(0),
          )
          .optional()
          .map_err(|e| eyre!("Failed to read key {}: {}", owned, e))
      })
      .await?;

    Ok(raw.and_then(|raw| decode_stored(key, &raw)))
  }

  async fn set(&self, key: &str, value: &Value) -> Result<()> {
    let key = key.to_string();
    let raw =
      serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize value: {}", e))?;

    self
      .with_conn(move |conn| {
        conn
          .execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, raw, Utc::now().timestamp_millis()],
          )
          .map_err(|e| eyre!("Failed to write key {}: {}", key, e))?;
        Ok(())
      })
      .await
  }

  async fn remove(&self, key: &str) -> Result<()> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn
          .execute("DELETE FROM kv_store WHERE key = ?", params![key])
          .map_err(|e| eyre!("Failed to remove key {}: {}", key, e))?;
        Ok(())
      })
      .await
  }

  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let prefix = prefix.to_string();
    self
      .with_conn(move |conn| {
        // substr avoids LIKE wildcard escaping for prefixes containing '%' or '_'
        let mut stmt = conn
          .prepare("SELECT key FROM kv_store WHERE substr(key, 1, ?) = ? ORDER BY key")
          .map_err(|e| eyre!("Failed to prepare key listing: {}", e))?;

        let keys = stmt
          .query_map(params![prefix.chars().count() as i64, prefix], |row| {
            row.get::<_, String>(0)
          })
          .map_err(|e| eyre!("Failed to list keys: {}", e))?
          .filter_map(|r| r.ok())
          .collect();

        Ok(keys)
      })
      .await
  }
}
