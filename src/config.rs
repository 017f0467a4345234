use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::DEFAULT_KEY_PREFIX;
use crate::queue::DEFAULT_MAX_TRIES;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  /// Per-request timeout; the cache layer itself never times out a fetch
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080/api/".to_string(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl ApiConfig {
  /// Parsed base URL, with a trailing slash so relative endpoints join under it.
  pub fn base_url(&self) -> Result<Url> {
    let mut raw = self.base_url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }
    Url::parse(&raw).map_err(|e| eyre!("Invalid api.base_url '{}': {}", self.base_url, e))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// SQLite file; defaults to $XDG_DATA_HOME/noor-sync/store.db
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// TTL for content without a specific policy
  #[serde(default = "default_ttl_secs")]
  pub default_ttl_secs: u64,
  #[serde(default = "default_key_prefix")]
  pub key_prefix: String,
  /// Bumping this turns every existing entry into a miss
  pub version: Option<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl_secs: default_ttl_secs(),
      key_prefix: default_key_prefix(),
      version: None,
    }
  }
}

impl CacheConfig {
  pub fn default_ttl_ms(&self) -> i64 {
    i64::try_from(self.default_ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
  #[serde(default = "default_max_tries")]
  pub max_tries: usize,
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_interval_secs(),
      max_tries: default_max_tries(),
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

impl SyncConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

fn default_timeout_secs() -> u64 {
  15
}

fn default_ttl_secs() -> u64 {
  5 * 60
}

fn default_key_prefix() -> String {
  DEFAULT_KEY_PREFIX.to_string()
}

fn default_interval_secs() -> u64 {
  60
}

fn default_max_tries() -> usize {
  DEFAULT_MAX_TRIES
}

fn default_probe_interval_secs() -> u64 {
  10
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./noor-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/noor-sync/config.yaml
  ///
  /// With no file found, defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("noor-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("noor-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.api.base_url()?;
    Ok(config)
  }

  /// Where the durable store lives.
  pub fn store_path(&self) -> Result<PathBuf> {
    match &self.store.path {
      Some(p) => Ok(p.clone()),
      None => crate::store::SqliteStore::default_path(),
    }
  }

  /// Directory for rolling log files, next to the store.
  pub fn log_dir(&self) -> Result<PathBuf> {
    let store = self.store_path()?;
    Ok(
      store
        .parent()
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs")),
    )
  }
}
