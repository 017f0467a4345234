use clap::{Parser, Subcommand};
use color_eyre::Result;
use noor_sync::app::App;
use noor_sync::config::Config;
use noor_sync::network::Reachability;
use noor_sync::{CacheOptions, CacheResult, KeyValueStore};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "noor-sync")]
#[command(about = "Inspect and drive the Noor offline cache and sync queue")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/noor-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log to stderr instead of the rolling log file
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show connectivity and the pending sync count
  Status,
  /// List pending writes in delivery order
  Queue,
  /// Replay pending writes now
  Flush {
    #[arg(long)]
    max_tries: Option<usize>,
  },
  /// Drop a pending write that can never succeed
  Discard { id: String },
  /// Keep syncing in the background until interrupted
  Run,
  /// Fetch the surah index through the cache
  Surahs,
  /// Fetch a page of Q&A through the cache
  Qa {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    limit: u32,
  },
  /// Inspect or invalidate cache entries
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// List cached keys
  List,
  /// Remove one key, or every entry with --all
  Clear {
    key: Option<String>,
    #[arg(long)]
    all: bool,
  },
}

fn init_logging(config: &Config, to_stderr: bool) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_env("NOOR_SYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  if to_stderr {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  }

  let appender = tracing_appender::rolling::daily(config.log_dir()?, "noor-sync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(Some(guard))
}

fn provenance<T>(result: &CacheResult<T>) -> &'static str {
  match (result.is_from_cache, result.is_stale) {
    (false, _) => "network",
    (true, false) => "cache",
    (true, true) => "cache (stale, offline)",
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _guard = init_logging(&config, args.log_stderr)?;

  let app = App::new(config)?;

  match args.command {
    Command::Status => {
      let online = app.probe()?.check().await == Reachability::Connected;
      let pending = app.queue().pending().await?;
      println!("connected: {}", online);
      println!("pending sync: {}", pending.len());
      if let Some(head) = pending.first() {
        println!("next: {} ({}) queued at {}", head.id, head.kind, head.created_at);
      }
    }
    Command::Queue => {
      for record in app.queue().pending().await? {
        println!(
          "{}\t{}\t{}\t{}",
          record.id, record.kind, record.created_at, record.payload
        );
      }
    }
    Command::Flush { max_tries } => {
      let max_tries = max_tries.unwrap_or(app.config().sync.max_tries);
      let report = app.queue().flush_all(max_tries).await?;
      println!("replayed: {}", report.replayed);
      println!("remaining: {}", report.remaining);
      if let Some(blocked) = report.blocked_on {
        println!("blocked on: {} ({})", blocked.id, blocked.kind);
      }
    }
    Command::Discard { id } => match app.queue().discard(&id).await? {
      Some(record) => println!("discarded: {} ({})", record.id, record.kind),
      None => return Err(color_eyre::eyre::eyre!("No pending write with id {}", id)),
    },
    Command::Run => {
      app
        .run_until(async {
          let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    }
    Command::Surahs => {
      let result = app.client().surahs().await?;
      println!("source: {}", provenance(&result));
      for surah in result.data {
        println!(
          "{:>3}  {:<20} {:<16} {} ayat",
          surah.number, surah.english_name, surah.name, surah.ayah_count
        );
      }
    }
    Command::Qa { page, limit } => {
      let result = app.client().qa_list(page, limit).await?;
      println!(
        "source: {} (page {} of {} items)",
        provenance(&result),
        result.data.page,
        result.data.total
      );
      for item in result.data.items {
        println!("{}\t{}", item.id, item.question);
      }
    }
    Command::Cache { action } => {
      let cache = app.client().cache();
      let prefix = app.config().cache.key_prefix.clone();
      match action {
        CacheAction::List => {
          for key in cache.storage().keys_with_prefix(&prefix).await? {
            println!("{}", key);
          }
        }
        CacheAction::Clear { all: true, .. } => {
          let opts = CacheOptions::default().with_key_prefix(prefix);
          let removed = cache.clear_all(&opts).await?;
          println!("removed {} entries", removed);
        }
        CacheAction::Clear { key: Some(key), .. } => {
          let opts = CacheOptions::default().with_key_prefix(prefix);
          cache.clear_cached(&key, &opts).await?;
          println!("removed {}", key);
        }
        CacheAction::Clear { key: None, .. } => {
          return Err(color_eyre::eyre::eyre!("Pass a key or --all"));
        }
      }
    }
  }

  Ok(())
}
