//! Content client with transparent caching and offline writes.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheLayer, CacheResult};
use crate::config::CacheConfig;
use crate::queue::{
  handler_fn, HandlerRegistry, MutationQueue, MutationRecord, MutationType, DEFAULT_MAX_TRIES,
};
use crate::store::KeyValueStore;

use super::cache::ContentQuery;
use super::client::ContentApi;
use super::types::{
  Comment, Dua, GroupProgress, GroupProgressUpdate, Hadith, NewComment, Page, QaItem, Surah,
};

/// Result of an optimistic write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
  /// The server accepted the write
  Sent(T),
  /// The network call failed, or older writes are still pending; the intent
  /// is queued for replay
  Queued(MutationRecord),
}

impl<T> WriteOutcome<T> {
  pub fn is_queued(&self) -> bool {
    matches!(self, Self::Queued(_))
  }
}

/// Build the replay handlers for every offline-capable write.
pub fn replay_handlers<A: ContentApi + 'static>(api: Arc<A>) -> HandlerRegistry {
  let comments = Arc::clone(&api);
  let groups = api;

  HandlerRegistry::new()
    .register(
      MutationType::CreateComment,
      handler_fn(move |payload| {
        let api = Arc::clone(&comments);
        async move {
          let comment: NewComment = decode_payload(payload)?;
          api.create_comment(&comment).await.map(|_| ())
        }
      }),
    )
    .register(
      MutationType::SetGroupProgress,
      handler_fn(move |payload| {
        let api = Arc::clone(&groups);
        async move {
          let update: GroupProgressUpdate = decode_payload(payload)?;
          api.set_group_progress(&update).await.map(|_| ())
        }
      }),
    )
}

fn decode_payload<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T> {
  serde_json::from_value(payload).map_err(|e| eyre!("Malformed mutation payload: {}", e))
}

/// Content client pairing reads with the cache and writes with the queue.
///
/// Reads report provenance so screens can show a stale banner; writes never
/// fail just because the device is offline.
pub struct CachedContentClient<S: KeyValueStore + 'static, A: ContentApi> {
  inner: Arc<A>,
  cache: CacheLayer<S>,
  queue: Arc<MutationQueue<S>>,
  config: CacheConfig,
}

impl<S: KeyValueStore + 'static, A: ContentApi> CachedContentClient<S, A> {
  pub fn new(
    inner: Arc<A>,
    cache: CacheLayer<S>,
    queue: Arc<MutationQueue<S>>,
    config: CacheConfig,
  ) -> Self {
    Self {
      inner,
      cache,
      queue,
      config,
    }
  }

  pub fn queue(&self) -> &Arc<MutationQueue<S>> {
    &self.queue
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  async fn read<T, F, Fut>(&self, query: ContentQuery, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Arc<A>) -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let opts = query.options(&self.config);
    let inner = Arc::clone(&self.inner);
    let result = self
      .cache
      .fetch_with_cache_result(&query.cache_key(), || fetcher(inner), &opts)
      .await?;
    if result.is_stale {
      info!(query = %query.description(), "Serving stale content while offline");
    }
    Ok(result)
  }

  /// Get the surah index with caching.
  pub async fn surahs(&self) -> Result<CacheResult<Vec<Surah>>> {
    self
      .read(ContentQuery::Surahs, |api| async move { api.surahs().await })
      .await
  }

  /// Get a page of hadith with caching.
  pub async fn hadiths(
    &self,
    collection: &str,
    page: u32,
    limit: u32,
  ) -> Result<CacheResult<Page<Hadith>>> {
    let query = ContentQuery::Hadiths {
      collection: collection.to_string(),
      page,
      limit,
    };
    let collection = collection.to_string();
    self
      .read(query, |api| async move {
        api.hadiths(&collection, page, limit).await
      })
      .await
  }

  /// Get a page of Q&A with caching.
  pub async fn qa_list(&self, page: u32, limit: u32) -> Result<CacheResult<Page<QaItem>>> {
    self
      .read(ContentQuery::QaList { page, limit }, |api| async move {
        api.qa_list(page, limit).await
      })
      .await
  }

  /// Get duas with caching.
  pub async fn duas(&self, category: Option<&str>) -> Result<CacheResult<Vec<Dua>>> {
    let category = category.map(String::from);
    let query = ContentQuery::Duas {
      category: category.clone(),
    };
    self
      .read(query, |api| async move { api.duas(category.as_deref()).await })
      .await
  }

  /// Get a reading group's progress with caching.
  pub async fn group_progress(&self, group_id: &str) -> Result<CacheResult<GroupProgress>> {
    let query = ContentQuery::GroupProgress {
      group_id: group_id.to_string(),
    };
    let group_id = group_id.to_string();
    self
      .read(query, |api| async move { api.group_progress(&group_id).await })
      .await
  }

  /// Post a comment, queueing it if the network call fails.
  pub async fn create_comment(&self, comment: NewComment) -> Result<WriteOutcome<Comment>> {
    let inner = Arc::clone(&self.inner);
    let sent = comment.clone();
    self
      .write(MutationType::CreateComment, &comment, || async move {
        inner.create_comment(&sent).await
      })
      .await
  }

  /// Set a reading group's progress, queueing it if the network call fails.
  ///
  /// Either way the cached progress is invalidated so the next read refetches.
  pub async fn set_group_progress(
    &self,
    update: GroupProgressUpdate,
  ) -> Result<WriteOutcome<GroupProgress>> {
    let inner = Arc::clone(&self.inner);
    let sent = update.clone();
    let outcome = self
      .write(MutationType::SetGroupProgress, &update, || async move {
        inner.set_group_progress(&sent).await
      })
      .await?;

    let query = ContentQuery::GroupProgress {
      group_id: update.group_id.clone(),
    };
    if let Err(e) = self
      .cache
      .clear_cached(&query.cache_key(), &query.options(&self.config))
      .await
    {
      warn!(group_id = %update.group_id, error = %e, "Failed to invalidate cached progress");
    }

    Ok(outcome)
  }

  /// Number of writes waiting to be replayed.
  pub async fn pending_count(&self) -> Result<usize> {
    self.queue.size().await
  }

  /// Send a write directly only when nothing older is waiting.
  ///
  /// Pending intents are drained first; if any remain, the new write goes
  /// behind them so the server sees writes in the order they were made.
  async fn write<P, T, F, Fut>(
    &self,
    kind: MutationType,
    payload: &P,
    send: F,
  ) -> Result<WriteOutcome<T>>
  where
    P: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if self.queue.size().await? > 0 {
      let report = self.queue.flush_all(DEFAULT_MAX_TRIES).await?;
      if report.remaining > 0 {
        let record = self.enqueue(kind, payload).await?;
        info!(
          id = %record.id,
          kind = %record.kind,
          ahead = report.remaining,
          "Earlier writes pending, queued behind them"
        );
        return Ok(WriteOutcome::Queued(record));
      }
    }

    match send().await {
      Ok(result) => Ok(WriteOutcome::Sent(result)),
      Err(e) => {
        let record = self.enqueue(kind, payload).await?;
        info!(id = %record.id, kind = %record.kind, error = %e, "Write failed, queued for sync");
        Ok(WriteOutcome::Queued(record))
      }
    }
  }

  // an enqueue failure is fatal to the caller; there is no lower fallback
  async fn enqueue<P: Serialize>(&self, kind: MutationType, payload: &P) -> Result<MutationRecord> {
    let payload = serde_json::to_value(payload)
      .map_err(|e| eyre!("Failed to serialize mutation payload: {}", e))?;
    self.queue.enqueue(kind, payload).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::store::MemoryStore;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;

  #[derive(Default)]
  struct FakeApi {
    offline: AtomicBool,
    surah_calls: AtomicUsize,
    comments: Mutex<Vec<NewComment>>,
    progress: Mutex<Vec<GroupProgressUpdate>>,
  }

  impl FakeApi {
    fn check(&self) -> Result<()> {
      if self.offline.load(Ordering::SeqCst) {
        Err(eyre!("network unreachable"))
      } else {
        Ok(())
      }
    }
  }

  #[async_trait]
  impl ContentApi for FakeApi {
    async fn surahs(&self) -> Result<Vec<Surah>> {
      self.check()?;
      self.surah_calls.fetch_add(1, Ordering::SeqCst);
      Ok(vec![Surah {
        number: 1,
        name: "الفاتحة".into(),
        english_name: "Al-Fatiha".into(),
        ayah_count: 7,
        revelation_type: "meccan".into(),
      }])
    }

    async fn hadiths(&self, collection: &str, page: u32, _limit: u32) -> Result<Page<Hadith>> {
      self.check()?;
      Ok(Page {
        items: vec![Hadith {
          id: "1".into(),
          collection: collection.into(),
          number: "1".into(),
          text: "Actions are by intentions".into(),
          grade: Some("sahih".into()),
        }],
        page,
        total: 1,
      })
    }

    async fn qa_list(&self, page: u32, _limit: u32) -> Result<Page<QaItem>> {
      self.check()?;
      Ok(Page {
        items: vec![],
        page,
        total: 0,
      })
    }

    async fn duas(&self, _category: Option<&str>) -> Result<Vec<Dua>> {
      self.check()?;
      Ok(vec![])
    }

    async fn group_progress(&self, group_id: &str) -> Result<GroupProgress> {
      self.check()?;
      let position = self
        .progress
        .lock()
        .unwrap()
        .iter()
        .rev()
        .find(|u| u.group_id == group_id)
        .map(|u| u.position)
        .unwrap_or(0);
      Ok(GroupProgress {
        group_id: group_id.into(),
        position,
        updated_at: "2026-01-01T00:00:00Z".into(),
      })
    }

    async fn create_comment(&self, comment: &NewComment) -> Result<Comment> {
      self.check()?;
      self.comments.lock().unwrap().push(comment.clone());
      Ok(Comment {
        id: format!("c{}", self.comments.lock().unwrap().len()),
        target_type: comment.target_type.clone(),
        target_id: comment.target_id.clone(),
        body: comment.body.clone(),
        created_at: "2026-01-01T00:00:00Z".into(),
      })
    }

    async fn set_group_progress(&self, update: &GroupProgressUpdate) -> Result<GroupProgress> {
      self.check()?;
      self.progress.lock().unwrap().push(update.clone());
      Ok(GroupProgress {
        group_id: update.group_id.clone(),
        position: update.position,
        updated_at: "2026-01-01T00:00:00Z".into(),
      })
    }
  }

  fn client(api: Arc<FakeApi>) -> (CachedContentClient<MemoryStore, FakeApi>, ManualClock) {
    let clock = ManualClock::new(1_700_000_000_000);
    let store = Arc::new(MemoryStore::new());
    let cache = CacheLayer::new(Arc::clone(&store)).with_clock(Arc::new(clock.clone()));
    let queue = Arc::new(
      MutationQueue::new(store, replay_handlers(Arc::clone(&api)))
        .with_clock(Arc::new(clock.clone())),
    );
    (
      CachedContentClient::new(api, cache, queue, CacheConfig::default()),
      clock,
    )
  }

  fn comment(body: &str) -> NewComment {
    NewComment {
      target_type: "qa".into(),
      target_id: "42".into(),
      body: body.into(),
    }
  }

  #[tokio::test]
  async fn test_reads_hit_cache_after_first_fetch() {
    let api = Arc::new(FakeApi::default());
    let (client, _clock) = client(Arc::clone(&api));

    let first = client.surahs().await.unwrap();
    assert!(!first.is_from_cache);
    let second = client.surahs().await.unwrap();
    assert!(second.is_from_cache);
    assert!(!second.is_stale);
    assert_eq!(api.surah_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_offline_read_without_cache_fails() {
    let api = Arc::new(FakeApi::default());
    api.offline.store(true, Ordering::SeqCst);
    let (client, _clock) = client(api);

    assert!(client.hadiths("bukhari", 1, 20).await.is_err());
  }

  #[tokio::test]
  async fn test_online_write_is_sent() {
    let api = Arc::new(FakeApi::default());
    let (client, _clock) = client(Arc::clone(&api));

    let outcome = client.create_comment(comment("salam")).await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Sent(ref c) if c.body == "salam"));
    assert_eq!(client.pending_count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_offline_writes_queue_and_replay_in_order() {
    let api = Arc::new(FakeApi::default());
    let (client, _clock) = client(Arc::clone(&api));
    api.offline.store(true, Ordering::SeqCst);

    assert!(client.create_comment(comment("first")).await.unwrap().is_queued());
    let progress = GroupProgressUpdate {
      group_id: "g1".into(),
      position: 12,
    };
    assert!(client.set_group_progress(progress).await.unwrap().is_queued());
    assert!(client.create_comment(comment("second")).await.unwrap().is_queued());
    assert_eq!(client.pending_count().await.unwrap(), 3);

    // still offline: nothing drains
    let report = client.queue().flush_all(DEFAULT_MAX_TRIES).await.unwrap();
    assert_eq!(report.remaining, 3);

    api.offline.store(false, Ordering::SeqCst);
    let report = client.queue().flush_all(DEFAULT_MAX_TRIES).await.unwrap();
    assert_eq!(report.replayed, 3);

    let bodies: Vec<String> = api.comments.lock().unwrap().iter().map(|c| c.body.clone()).collect();
    assert_eq!(bodies, vec!["first".to_string(), "second".to_string()]);
    assert_eq!(api.progress.lock().unwrap()[0].position, 12);
  }

  #[tokio::test]
  async fn test_progress_write_invalidates_cached_read() {
    let api = Arc::new(FakeApi::default());
    let (client, _clock) = client(Arc::clone(&api));

    let before = client.group_progress("g1").await.unwrap();
    assert_eq!(before.data.position, 0);

    client
      .set_group_progress(GroupProgressUpdate {
        group_id: "g1".into(),
        position: 30,
      })
      .await
      .unwrap();

    let after = client.group_progress("g1").await.unwrap();
    assert!(!after.is_from_cache);
    assert_eq!(after.data.position, 30);
  }

  fn positions(api: &FakeApi) -> Vec<u32> {
    api.progress.lock().unwrap().iter().map(|u| u.position).collect()
  }

  #[tokio::test]
  async fn test_online_write_drains_older_queued_write_first() {
    let api = Arc::new(FakeApi::default());
    let (client, _clock) = client(Arc::clone(&api));

    api.offline.store(true, Ordering::SeqCst);
    let queued = client
      .set_group_progress(GroupProgressUpdate {
        group_id: "g1".into(),
        position: 12,
      })
      .await
      .unwrap();
    assert!(queued.is_queued());

    api.offline.store(false, Ordering::SeqCst);
    let sent = client
      .set_group_progress(GroupProgressUpdate {
        group_id: "g1".into(),
        position: 30,
      })
      .await
      .unwrap();
    assert!(!sent.is_queued());
    assert_eq!(client.pending_count().await.unwrap(), 0);

    // a later drain has nothing left to replay over the newer value
    let report = client.queue().flush_all(DEFAULT_MAX_TRIES).await.unwrap();
    assert_eq!(report.replayed, 0);
    assert_eq!(positions(&api), vec![12, 30]);
    assert_eq!(client.group_progress("g1").await.unwrap().data.position, 30);
  }

  #[tokio::test]
  async fn test_write_queues_behind_blocked_head() {
    let api = Arc::new(FakeApi::default());
    let (client, _clock) = client(Arc::clone(&api));

    let stuck = client
      .queue()
      .enqueue(MutationType::SetGroupProgress, serde_json::json!({"nope": true}))
      .await
      .unwrap();

    let outcome = client
      .set_group_progress(GroupProgressUpdate {
        group_id: "g1".into(),
        position: 30,
      })
      .await
      .unwrap();
    assert!(outcome.is_queued());
    assert!(positions(&api).is_empty());

    client.queue().discard(&stuck.id).await.unwrap();
    let report = client.queue().flush_all(DEFAULT_MAX_TRIES).await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(positions(&api), vec![30]);
  }

  #[tokio::test]
  async fn test_malformed_payload_blocks_queue() {
    let api = Arc::new(FakeApi::default());
    let (client, _clock) = client(api);

    client
      .queue()
      .enqueue(MutationType::CreateComment, serde_json::json!({"nope": true}))
      .await
      .unwrap();
    assert!(!client.queue().flush_once().await.unwrap());
    assert_eq!(client.pending_count().await.unwrap(), 1);
  }
}
