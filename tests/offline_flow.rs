//! End-to-end behaviour of the cache, queue, monitor and sync loop together.

use color_eyre::{eyre::eyre, Result};
use noor_sync::cache::CacheOptions;
use noor_sync::network::{receiver_stream, Reachability};
use noor_sync::queue::{handler_fn, DEFAULT_MAX_TRIES};
use noor_sync::remote::types::Surah;
use noor_sync::{
  CacheLayer, FlushReport, HandlerRegistry, KeyValueStore, ManualClock, MemoryStore,
  MutationQueue, MutationType, NetworkMonitor, SqliteStore, SyncOrchestrator,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1000;
const T0: i64 = 1_767_225_600_000;

fn surah(number: u32, english_name: &str) -> Surah {
  Surah {
    number,
    name: String::new(),
    english_name: english_name.to_string(),
    ayah_count: 7,
    revelation_type: "meccan".to_string(),
  }
}

#[tokio::test]
async fn surah_index_freshness_and_offline_fallback() {
  let clock = ManualClock::new(T0);
  let cache = CacheLayer::new(Arc::new(MemoryStore::new())).with_clock(Arc::new(clock.clone()));
  let opts = CacheOptions::new(WEEK_MS);
  let original = vec![surah(1, "Al-Fatiha"), surah(2, "Al-Baqarah")];

  cache.set_cached("quran:surahs", &original, &opts).await.unwrap();

  // 1ms before expiry: fresh hit, fetcher not consulted
  clock.set(T0 + WEEK_MS - 1);
  let fetched = Arc::new(AtomicBool::new(false));
  let flag = fetched.clone();
  let hit = cache
    .fetch_with_cache_result(
      "quran:surahs",
      || async move {
        flag.store(true, Ordering::SeqCst);
        Ok(Vec::<Surah>::new())
      },
      &opts,
    )
    .await
    .unwrap();
  assert!(!fetched.load(Ordering::SeqCst));
  assert_eq!(hit.data, original);
  assert!(hit.is_from_cache);
  assert!(!hit.is_stale);

  // past expiry with the network down: stale fallback
  clock.set(T0 + WEEK_MS + 1);
  let stale = cache
    .fetch_with_cache_result::<Vec<Surah>, _, _>(
      "quran:surahs",
      || async { Err(eyre!("no route to host")) },
      &opts,
    )
    .await
    .unwrap();
  assert_eq!(stale.data, original);
  assert!(stale.is_from_cache);
  assert!(stale.is_stale);

  // network back: new data replaces the entry and created_at advances
  let updated = vec![surah(1, "The Opening")];
  let fetched = updated.clone();
  let fresh = cache
    .fetch_with_cache_result("quran:surahs", || async move { Ok(fetched) }, &opts)
    .await
    .unwrap();
  assert_eq!(fresh.data, updated);
  assert!(!fresh.is_from_cache);
  assert!(!fresh.is_stale);

  let entry = cache
    .get_cached_entry::<Vec<Surah>>("quran:surahs", &opts)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(entry.created_at, T0 + WEEK_MS + 1);
  assert_eq!(entry.expires_at, T0 + 2 * WEEK_MS + 1);
}

#[tokio::test]
async fn queue_survives_restart_on_sqlite() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("store.db");

  {
    let store = Arc::new(SqliteStore::open_at(&path).unwrap());
    let queue = MutationQueue::new(store, HandlerRegistry::new());
    queue
      .enqueue(MutationType::CreateComment, json!({"body": "A"}))
      .await
      .unwrap();
    queue
      .enqueue(MutationType::SetGroupProgress, json!({"groupId": "g", "position": 4}))
      .await
      .unwrap();
  }

  let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
  let sink = seen.clone();
  let record = move |payload: Value| {
    let sink = sink.clone();
    async move {
      sink.lock().unwrap().push(payload);
      Result::<()>::Ok(())
    }
  };
  let handlers = HandlerRegistry::new()
    .register(MutationType::CreateComment, handler_fn(record.clone()))
    .register(MutationType::SetGroupProgress, handler_fn(record));

  let store = Arc::new(SqliteStore::open_at(&path).unwrap());
  let queue = MutationQueue::new(Arc::clone(&store), handlers);
  assert_eq!(queue.size().await.unwrap(), 2);

  let report = queue.flush_all(DEFAULT_MAX_TRIES).await.unwrap();
  assert_eq!(report.replayed, 2);
  assert_eq!(
    *seen.lock().unwrap(),
    vec![json!({"body": "A"}), json!({"groupId": "g", "position": 4})]
  );
  assert_eq!(store.get("offline:mutationQueue").await.unwrap(), Some(json!([])));
}

#[tokio::test]
async fn cache_and_queue_share_one_namespace() {
  let store = Arc::new(MemoryStore::new());
  let cache = CacheLayer::new(Arc::clone(&store));
  let queue = MutationQueue::new(Arc::clone(&store), HandlerRegistry::new());

  cache
    .set_cached("qa:list", &json!([]), &CacheOptions::new(60_000))
    .await
    .unwrap();
  queue.enqueue(MutationType::CreateComment, json!({})).await.unwrap();

  let mut keys = store.keys_with_prefix("").await.unwrap();
  keys.sort();
  assert_eq!(keys, vec!["cache:qa:list".to_string(), "offline:mutationQueue".to_string()]);

  // clearing the cache leaves pending writes alone
  cache.clear_all(&CacheOptions::default()).await.unwrap();
  assert_eq!(queue.size().await.unwrap(), 1);
}

async fn wait_for_drain(reports: &mut watch::Receiver<Option<FlushReport>>) -> FlushReport {
  loop {
    tokio::time::timeout(Duration::from_secs(5), reports.changed())
      .await
      .expect("timed out waiting for a sync pass")
      .unwrap();
    if let Some(report) = reports.borrow_and_update().clone() {
      if report.remaining == 0 {
        return report;
      }
    }
  }
}

#[tokio::test]
async fn reconnect_edge_drains_queue() {
  let server_up = Arc::new(AtomicBool::new(false));
  let delivered = Arc::new(Mutex::new(Vec::<Value>::new()));

  let up = server_up.clone();
  let sink = delivered.clone();
  let handlers = HandlerRegistry::new().register(
    MutationType::CreateComment,
    handler_fn(move |payload| {
      let up = up.clone();
      let sink = sink.clone();
      async move {
        if !up.load(Ordering::SeqCst) {
          return Err(eyre!("connection refused"));
        }
        sink.lock().unwrap().push(payload);
        Result::<()>::Ok(())
      }
    }),
  );
  let queue = Arc::new(MutationQueue::new(Arc::new(MemoryStore::new()), handlers));

  for body in ["A", "B", "C"] {
    queue
      .enqueue(MutationType::CreateComment, json!({ "body": body }))
      .await
      .unwrap();
  }

  let (sync, task) = SyncOrchestrator::new(Arc::clone(&queue), Duration::from_secs(3600)).start();
  let mut reports = sync.reports();
  let monitor = Arc::new(NetworkMonitor::new(true).with_reconnect_hook(Arc::new(sync.clone())));

  let (tx, rx) = mpsc::channel(8);
  let monitor_task = {
    let monitor = Arc::clone(&monitor);
    tokio::spawn(async move { monitor.run(receiver_stream(rx)).await })
  };

  tx.send(Reachability::Disconnected).await.unwrap();
  // the server comes back before the device notices
  server_up.store(true, Ordering::SeqCst);
  tx.send(Reachability::Connected).await.unwrap();

  let report = wait_for_drain(&mut reports).await;
  assert_eq!(report.remaining, 0);
  assert_eq!(
    *delivered.lock().unwrap(),
    vec![json!({"body": "A"}), json!({"body": "B"}), json!({"body": "C"})]
  );

  drop(tx);
  monitor_task.await.unwrap();
  sync.shutdown();
  task.await.unwrap();
}

#[tokio::test]
async fn fetcher_error_is_propagated_unchanged() -> Result<()> {
  let cache = CacheLayer::new(Arc::new(MemoryStore::new()));
  let err = cache
    .fetch_with_cache::<Value, _, _>(
      "dua:list",
      || async { Err(eyre!("HTTP 503")) },
      &CacheOptions::new(60_000),
    )
    .await
    .unwrap_err();
  assert_eq!(err.to_string(), "HTTP 503");
  Ok(())
}
