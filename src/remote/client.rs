use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use url::Url;

use crate::config::ApiConfig;
use crate::remote::types::{
  Comment, Dua, GroupProgress, GroupProgressUpdate, Hadith, NewComment, Page, QaItem, Surah,
};

/// Remote operations the facade needs.
///
/// Failures must come back as `Err` so the cache layer's fallback and the
/// queue's enqueue-on-failure paths trigger.
#[async_trait]
pub trait ContentApi: Send + Sync {
  async fn surahs(&self) -> Result<Vec<Surah>>;
  async fn hadiths(&self, collection: &str, page: u32, limit: u32) -> Result<Page<Hadith>>;
  async fn qa_list(&self, page: u32, limit: u32) -> Result<Page<QaItem>>;
  async fn duas(&self, category: Option<&str>) -> Result<Vec<Dua>>;
  async fn group_progress(&self, group_id: &str) -> Result<GroupProgress>;
  async fn create_comment(&self, comment: &NewComment) -> Result<Comment>;
  async fn set_group_progress(&self, update: &GroupProgressUpdate) -> Result<GroupProgress>;
}

/// REST client for the content service
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base_url = config.base_url()?;
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .gzip(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Resolve path segments under the base URL. Each segment is
  /// percent-encoded, so ids cannot escape into another endpoint.
  fn endpoint(&self, segments: &[&str]) -> Result<Url> {
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
      return Err(eyre!("Invalid path segment '{}'", bad));
    }
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Base URL cannot hold a path: {}", self.base_url))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
    let response = self
      .http
      .get(url.clone())
      .query(query)
      .send()
      .await
      .map_err(|e| eyre!("Failed to GET {}: {}", url, e))?
      .error_for_status()
      .map_err(|e| eyre!("GET {} returned error: {}", url, e))?;

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }

  async fn send_json<B, T>(&self, method: reqwest::Method, url: Url, body: &B) -> Result<T>
  where
    B: Serialize + Sync,
    T: DeserializeOwned,
  {
    let response = self
      .http
      .request(method.clone(), url.clone())
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to {} {}: {}", method, url, e))?
      .error_for_status()
      .map_err(|e| eyre!("{} {} returned error: {}", method, url, e))?;

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }
}

#[async_trait]
impl ContentApi for ApiClient {
  async fn surahs(&self) -> Result<Vec<Surah>> {
    self.get_json(self.endpoint(&["quran", "surahs"])?, &[]).await
  }

  async fn hadiths(&self, collection: &str, page: u32, limit: u32) -> Result<Page<Hadith>> {
    self
      .get_json(
        self.endpoint(&["hadith"])?,
        &[
          ("collection", collection.to_string()),
          ("page", page.to_string()),
          ("limit", limit.to_string()),
        ],
      )
      .await
  }

  async fn qa_list(&self, page: u32, limit: u32) -> Result<Page<QaItem>> {
    self
      .get_json(
        self.endpoint(&["qa"])?,
        &[("page", page.to_string()), ("limit", limit.to_string())],
      )
      .await
  }

  async fn duas(&self, category: Option<&str>) -> Result<Vec<Dua>> {
    let query: Vec<(&str, String)> = category
      .map(|c| vec![("category", c.to_string())])
      .unwrap_or_default();
    self.get_json(self.endpoint(&["duas"])?, &query).await
  }

  async fn group_progress(&self, group_id: &str) -> Result<GroupProgress> {
    self
      .get_json(self.endpoint(&["groups", group_id, "progress"])?, &[])
      .await
  }

  async fn create_comment(&self, comment: &NewComment) -> Result<Comment> {
    self
      .send_json(reqwest::Method::POST, self.endpoint(&["comments"])?, comment)
      .await
  }

  async fn set_group_progress(&self, update: &GroupProgressUpdate) -> Result<GroupProgress> {
    let url = self.endpoint(&["groups", &update.group_id, "progress"])?;
    self.send_json(reqwest::Method::PUT, url, update).await
  }
}
