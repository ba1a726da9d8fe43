use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use std::path::PathBuf;

use sheetcache::cache::{CacheCoordinator, CacheKey, PersistentStore, Table};
use sheetcache::config::Config;
use sheetcache::{logging, source};

#[derive(Parser, Debug)]
#[command(name = "sheetcache")]
#[command(about = "Cached reads of remote spreadsheet ranges")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./sheetcache.yaml, then $XDG_CONFIG_HOME/sheetcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log filter, overriding RUST_LOG and the config file
  #[arg(long)]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Read one range and print it as JSON
  Read {
    resource_id: String,
    range: String,
    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
    /// Print cache statistics to stderr afterwards
    #[arg(long)]
    stats: bool,
  },
  /// Read several RESOURCE_ID:RANGE keys, printing one JSON line per key
  Batch {
    #[arg(required = true)]
    keys: Vec<String>,
    /// Stop at the first failing key
    #[arg(long)]
    fail_fast: bool,
    /// Print cache statistics to stderr afterwards
    #[arg(long)]
    stats: bool,
  },
  /// Drop cached entries (everything, one resource, or one range)
  Invalidate {
    #[arg(long)]
    resource: Option<String>,
    #[arg(long, requires = "resource")]
    range: Option<String>,
  },
  /// Print cache statistics
  Stats,
  /// List entries in the cache file without contacting the source
  Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging, args.log_level.as_deref())?;

  match args.command {
    Command::Read {
      resource_id,
      range,
      pretty,
      stats,
    } => {
      let cache = source::connect(&config)?;
      let table = read_range(&cache, &config, &resource_id, &range).await?;

      let output = if pretty {
        serde_json::to_string_pretty(&table)?
      } else {
        serde_json::to_string(&table)?
      };
      println!("{output}");

      if stats {
        print_stats(&cache).await?;
      }
    }

    Command::Batch {
      keys,
      fail_fast,
      stats,
    } => {
      let keys = keys
        .iter()
        .map(|raw| parse_key(raw))
        .collect::<Result<Vec<_>>>()?;
      let cache = source::connect(&config)?;

      let failed = if fail_fast {
        let tables = cache.batch_get_fail_fast(&keys).await;
        persist_if_manual(&cache, &config).await;
        let tables = tables.map_err(|e| eyre!("Batch read failed: {}", e))?;
        for (key, table) in keys.iter().zip(tables) {
          println!("{}", json!({ "key": key.to_string(), "data": table }));
        }
        0
      } else {
        let results = cache.batch_get(&keys).await;
        persist_if_manual(&cache, &config).await;

        let mut failed = 0;
        for (key, result) in keys.iter().zip(results) {
          match result {
            Ok(table) => println!("{}", json!({ "key": key.to_string(), "data": table })),
            Err(e) => {
              eprintln!("{key}: {e}");
              failed += 1;
            }
          }
        }
        failed
      };

      if stats {
        print_stats(&cache).await?;
      }

      if failed > 0 {
        return Err(eyre!("{} of {} reads failed", failed, keys.len()));
      }
    }

    Command::Invalidate { resource, range } => {
      let cache = source::connect(&config)?;
      let removed =
        invalidate_entries(&cache, &config, resource.as_deref(), range.as_deref()).await;
      println!("Invalidated {removed} cache entries");
    }

    Command::Stats => {
      let cache = source::connect(&config)?;
      let snapshot = cache.statistics().await;
      println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    Command::Inspect => {
      let store = PersistentStore::new(&config.cache.file_path);
      let entries = store.load();
      if entries.is_empty() {
        println!("No cached entries in {}", store.path().display());
      }
      for (key, entry) in entries {
        println!(
          "{}\t{} rows\tmodified {}\tcached {}",
          key,
          entry.value.len(),
          entry.modified_time.to_rfc3339(),
          entry.cached_at.to_rfc3339()
        );
      }
    }
  }

  Ok(())
}

/// Parse a `RESOURCE_ID:RANGE` command-line key.
fn parse_key(raw: &str) -> Result<CacheKey> {
  match raw.split_once(':') {
    Some((id, range)) if !id.is_empty() && !range.is_empty() => Ok(CacheKey::new(id, range)),
    _ => Err(eyre!("Expected RESOURCE_ID:RANGE, got '{}'", raw)),
  }
}

async fn read_range(
  cache: &CacheCoordinator,
  config: &Config,
  resource_id: &str,
  range: &str,
) -> Result<Table> {
  let result = cache.read_cached(resource_id, range).await;
  persist_if_manual(cache, config).await;
  result.map_err(|e| eyre!("Failed to read {}:{}: {}", resource_id, range, e))
}

async fn invalidate_entries(
  cache: &CacheCoordinator,
  config: &Config,
  resource: Option<&str>,
  range: Option<&str>,
) -> usize {
  let removed = cache.invalidate(resource, range).await;
  persist_if_manual(cache, config).await;
  removed
}

/// With `auto_save` off nothing reaches disk unless written before exit.
async fn persist_if_manual(cache: &CacheCoordinator, config: &Config) {
  if config.cache.enabled && !config.cache.auto_save {
    cache.persist().await;
  }
}

async fn print_stats(cache: &CacheCoordinator) -> Result<()> {
  let snapshot = cache.statistics().await;
  eprintln!("{}", serde_json::to_string(&snapshot)?);
  Ok(())
}
