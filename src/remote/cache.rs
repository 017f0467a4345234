//! Cache keys and freshness policy for content queries.

use serde_json::{json, Value};

use crate::cache::{make_cache_key, CacheOptions};
use crate::config::CacheConfig;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Read queries served through the cache.
#[derive(Clone, Debug)]
pub enum ContentQuery {
  /// Quran surah index; effectively static
  Surahs,
  /// One page of a hadith collection
  Hadiths {
    collection: String,
    page: u32,
    limit: u32,
  },
  /// One page of Q&A
  QaList { page: u32, limit: u32 },
  /// Supplications, optionally by category
  Duas { category: Option<String> },
  /// A reading group's current position
  GroupProgress { group_id: String },
}

impl ContentQuery {
  fn base(&self) -> &'static str {
    match self {
      Self::Surahs => "quran:surahs",
      Self::Hadiths { .. } => "hadith:list",
      Self::QaList { .. } => "qa:list",
      Self::Duas { .. } => "dua:list",
      Self::GroupProgress { .. } => "group:progress",
    }
  }

  fn params(&self) -> Value {
    match self {
      Self::Surahs => Value::Null,
      Self::Hadiths {
        collection,
        page,
        limit,
      } => json!({ "collection": collection, "page": page, "limit": limit }),
      Self::QaList { page, limit } => json!({ "page": page, "limit": limit }),
      Self::Duas { category } => match category {
        Some(c) => json!({ "category": c }),
        None => Value::Null,
      },
      Self::GroupProgress { group_id } => json!({ "groupId": group_id }),
    }
  }

  /// Deterministic cache key for this query.
  pub fn cache_key(&self) -> String {
    make_cache_key(self.base(), &self.params())
  }

  /// Time to live for this kind of content.
  ///
  /// Scripture is near-static; community content and progress move quickly.
  pub fn ttl_ms(&self, config: &CacheConfig) -> i64 {
    match self {
      Self::Surahs => 7 * DAY_MS,
      Self::Hadiths { .. } | Self::Duas { .. } => DAY_MS,
      Self::QaList { .. } | Self::GroupProgress { .. } => config.default_ttl_ms(),
    }
  }

  pub fn options(&self, config: &CacheConfig) -> CacheOptions {
    let mut opts = CacheOptions::new(self.ttl_ms(config)).with_key_prefix(config.key_prefix.clone());
    if let Some(version) = &config.version {
      opts = opts.with_version(version.clone());
    }
    opts
  }

  pub fn description(&self) -> String {
    match self {
      Self::Surahs => "surah index".to_string(),
      Self::Hadiths {
        collection, page, ..
      } => format!("{} hadiths, page {}", collection, page),
      Self::QaList { page, .. } => format!("questions, page {}", page),
      Self::Duas { category } => match category {
        Some(c) => format!("duas in {}", c),
        None => "all duas".to_string(),
      },
      Self::GroupProgress { group_id } => format!("progress for group {}", group_id),
    }
  }
}
