//! Cache coordinator that orchestrates caching logic with remote fetching.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;

use super::error::SourceError;
use super::memory::MemoryStore;
use super::stats::{CacheStatistics, StatisticsSnapshot};
use super::storage::PersistentStore;
use super::traits::{CacheEntry, CacheKey, CacheResult, DataFetcher, FreshnessOracle, Table};

/// Mutable state guarded by the coordinator's lock.
struct CacheState {
  memory: MemoryStore,
  /// None when caching is disabled or after a failed save.
  storage: Option<PersistentStore>,
  /// Memory differs from what was last written to disk.
  dirty: bool,
}

/// Read-through cache in front of a remote tabular source.
///
/// Sits between business logic and the remote client. Entries are served
/// from memory as long as the source's modification time is not newer than
/// the one recorded at fetch time; otherwise the range is fetched again.
///
/// One lock covers the whole check-then-fetch sequence, so at most one fetch
/// is in flight per coordinator. Construct one instance and share it with
/// `Arc`.
pub struct CacheCoordinator {
  oracle: Arc<dyn FreshnessOracle>,
  fetcher: Arc<dyn DataFetcher>,
  state: Mutex<CacheState>,
  stats: CacheStatistics,
  enabled: bool,
  auto_save: bool,
}

impl CacheCoordinator {
  /// Create a coordinator, loading the on-disk tier when caching is enabled.
  pub fn new(
    config: &CacheConfig,
    oracle: Arc<dyn FreshnessOracle>,
    fetcher: Arc<dyn DataFetcher>,
  ) -> Self {
    let mut memory = MemoryStore::new(config.max_size);

    let storage = if config.enabled {
      let store = PersistentStore::new(&config.file_path);
      let loaded = store.load();
      // Stored oldest-first; keep the most recent ones if the file outgrew max_size.
      let skip = loaded.len().saturating_sub(memory.max_size());
      for (key, entry) in loaded.into_iter().skip(skip) {
        memory.put(key, entry);
      }
      Some(store)
    } else {
      None
    };

    if config.enabled {
      info!(
        max_size = memory.max_size(),
        entries = memory.len(),
        auto_save = config.auto_save,
        "Cache coordinator initialized"
      );
    } else {
      info!("Cache coordinator initialized (caching disabled)");
    }

    Self {
      oracle,
      fetcher,
      state: Mutex::new(CacheState {
        memory,
        storage,
        dirty: false,
      }),
      stats: CacheStatistics::new(),
      enabled: config.enabled,
      auto_save: config.auto_save,
    }
  }

  /// Create a coordinator over one client that answers both questions.
  pub fn with_source<S>(config: &CacheConfig, source: Arc<S>) -> Self
  where
    S: FreshnessOracle + DataFetcher + 'static,
  {
    let oracle: Arc<dyn FreshnessOracle> = source.clone();
    let fetcher: Arc<dyn DataFetcher> = source;
    Self::new(config, oracle, fetcher)
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Live counters.
  pub fn stats(&self) -> &CacheStatistics {
    &self.stats
  }

  /// Read a range, serving it from memory while the resource is unmodified.
  pub async fn get_or_fetch(&self, key: &CacheKey) -> Result<Table, SourceError> {
    self.get_or_fetch_with_source(key).await.map(|r| r.data)
  }

  /// Like [`get_or_fetch`](Self::get_or_fetch), also reporting where the data came from.
  pub async fn get_or_fetch_with_source(
    &self,
    key: &CacheKey,
  ) -> Result<CacheResult<Table>, SourceError> {
    if !self.enabled {
      return self.fetch_uncached(key).await;
    }

    let mut state = self.state.lock().await;
    let result = self.lookup(&mut state, key).await;
    self.auto_save(&mut state);
    result
  }

  /// Read several ranges in order, one result per key.
  ///
  /// A failing key does not stop the batch. The file is written once at the end.
  pub async fn batch_get(&self, keys: &[CacheKey]) -> Vec<Result<Table, SourceError>> {
    let mut results = Vec::with_capacity(keys.len());

    for key in keys {
      let result = if self.enabled {
        let mut state = self.state.lock().await;
        self.lookup(&mut state, key).await
      } else {
        self.fetch_uncached(key).await
      };
      results.push(result.map(|r| r.data));
    }

    if self.enabled && !keys.is_empty() {
      let mut state = self.state.lock().await;
      self.auto_save(&mut state);
    }

    results
  }

  /// Read several ranges in order, stopping at the first failure.
  pub async fn batch_get_fail_fast(&self, keys: &[CacheKey]) -> Result<Vec<Table>, SourceError> {
    let mut tables = Vec::with_capacity(keys.len());
    let mut outcome = Ok(());

    for key in keys {
      let result = if self.enabled {
        let mut state = self.state.lock().await;
        self.lookup(&mut state, key).await
      } else {
        self.fetch_uncached(key).await
      };

      match result {
        Ok(r) => tables.push(r.data),
        Err(e) => {
          outcome = Err(e);
          break;
        }
      }
    }

    if self.enabled {
      let mut state = self.state.lock().await;
      self.auto_save(&mut state);
    }

    outcome.map(|()| tables)
  }

  /// Drop one cached range. Returns whether it was cached.
  pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
    let mut state = self.state.lock().await;
    let removed = state.memory.remove(key).is_some();

    if removed {
      self.stats.record_invalidations(1);
      state.dirty = true;
      info!(%key, "Invalidated cache entry");
    }

    self.auto_save(&mut state);
    removed
  }

  /// Drop every cached range of one resource, leaving other resources alone.
  pub async fn invalidate_resource(&self, resource_id: &str) -> usize {
    let mut state = self.state.lock().await;
    let removed = state.memory.remove_where(|id| id == resource_id).len();

    if removed > 0 {
      self.stats.record_invalidations(removed as u64);
      state.dirty = true;
    }
    info!(resource_id, removed, "Invalidated cache entries for resource");

    self.auto_save(&mut state);
    removed
  }

  /// Drop everything.
  pub async fn invalidate_all(&self) -> usize {
    let mut state = self.state.lock().await;
    let removed = state.memory.clear();

    if removed > 0 {
      self.stats.record_invalidations(removed as u64);
      state.dirty = true;
    }
    info!(removed, "Invalidated entire cache");

    self.auto_save(&mut state);
    removed
  }

  /// Write the current state to disk regardless of `auto_save`.
  ///
  /// Returns false when persistence is unavailable or the write failed.
  pub async fn persist(&self) -> bool {
    let mut state = self.state.lock().await;
    self.save(&mut state)
  }

  /// Copy of a cached entry, without affecting recency.
  pub async fn cached_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
    let state = self.state.lock().await;
    state.memory.peek(key).cloned()
  }

  /// Keys currently in memory, least recently used first.
  pub async fn cached_keys(&self) -> Vec<CacheKey> {
    let state = self.state.lock().await;
    state.memory.iter().map(|(k, _)| k.clone()).collect()
  }

  pub async fn statistics(&self) -> StatisticsSnapshot {
    let state = self.state.lock().await;
    self
      .stats
      .snapshot(state.memory.len(), state.memory.max_size(), self.enabled)
  }

  /// Read one range by its parts.
  pub async fn read_cached(
    &self,
    resource_id: &str,
    range_spec: &str,
  ) -> Result<Table, SourceError> {
    self.get_or_fetch(&CacheKey::new(resource_id, range_spec)).await
  }

  /// Read `(resource_id, range_spec)` pairs in order, one result per pair.
  pub async fn batch_read_cached<S: AsRef<str>>(
    &self,
    requests: &[(S, S)],
  ) -> Vec<Result<Table, SourceError>> {
    let keys: Vec<CacheKey> = requests
      .iter()
      .map(|(id, range)| CacheKey::new(id.as_ref(), range.as_ref()))
      .collect();
    self.batch_get(&keys).await
  }

  /// No arguments clears everything, a resource id clears that resource, and
  /// both narrow to a single range.
  pub async fn invalidate(&self, resource_id: Option<&str>, range_spec: Option<&str>) -> usize {
    match (resource_id, range_spec) {
      (None, None) => self.invalidate_all().await,
      (Some(id), None) => self.invalidate_resource(id).await,
      (Some(id), Some(range)) => usize::from(self.invalidate_key(&CacheKey::new(id, range)).await),
      (None, Some(range)) => {
        warn!(range_spec = range, "Range given without resource id, nothing invalidated");
        0
      }
    }
  }

  /// One pass of the read-through algorithm with the lock held.
  async fn lookup(
    &self,
    state: &mut CacheState,
    key: &CacheKey,
  ) -> Result<CacheResult<Table>, SourceError> {
    self.stats.record_read();

    let mut observed_modified = None;

    if let Some(cached) = state.memory.get(key).cloned() {
      match self.oracle.get_modification_time(key.resource_id()).await {
        Ok(current) if cached.is_current(current) => {
          debug!(%key, "Memory cache hit");
          self.stats.record_memory_hit();
          return Ok(CacheResult::from_cache(cached.value, cached.cached_at));
        }
        Ok(current) => {
          debug!(
            %key,
            cached = %cached.modified_time,
            current = %current,
            "Resource modified, dropping cached entry"
          );
          state.memory.remove(key);
          state.dirty = true;
          self.stats.record_invalidations(1);
          observed_modified = Some(current);
        }
        Err(SourceError::NotFound(detail)) => {
          warn!(%key, "Resource no longer exists, purging cached entry");
          state.memory.remove(key);
          state.dirty = true;
          self.stats.record_invalidations(1);
          // Purge from disk right away so a restart does not resurrect it.
          self.save(state);
          return Err(SourceError::NotFound(detail));
        }
        Err(e) => {
          warn!(%key, error = %e, "Freshness check failed, serving cached data");
          self.stats.record_degraded_hit();
          return Ok(CacheResult::offline(cached.value, cached.cached_at));
        }
      }
    }

    debug!(%key, "Cache miss, fetching from source");

    // Capture the modification time before reading so a write racing with the
    // read shows up as newer on the next check.
    let modified_time = match observed_modified {
      Some(t) => t,
      None => self.oracle.get_modification_time(key.resource_id()).await?,
    };
    let data = match self.fetcher.read(key.resource_id(), key.range_spec()).await {
      Ok(data) => data,
      Err(SourceError::NotFound(detail)) => {
        if observed_modified.is_some() {
          // The stale entry was already dropped from memory; drop it on disk too.
          self.save(state);
        }
        return Err(SourceError::NotFound(detail));
      }
      Err(e) => return Err(e),
    };
    self.stats.record_api_call();

    let entry = CacheEntry::new(data.clone(), modified_time);
    if let Some((evicted, _)) = state.memory.put(key.clone(), entry) {
      debug!(key = %evicted, "Evicted cache entry (LRU)");
      self.stats.record_eviction();
    }
    state.dirty = true;

    Ok(CacheResult::from_network(data))
  }

  /// Straight to the source, used when caching is disabled.
  async fn fetch_uncached(&self, key: &CacheKey) -> Result<CacheResult<Table>, SourceError> {
    self.stats.record_read();
    let data = self.fetcher.read(key.resource_id(), key.range_spec()).await?;
    self.stats.record_api_call();
    Ok(CacheResult::from_network(data))
  }

  fn auto_save(&self, state: &mut CacheState) {
    if self.auto_save && state.dirty {
      self.save(state);
    }
  }

  fn save(&self, state: &mut CacheState) -> bool {
    let Some(store) = state.storage.as_ref() else {
      return false;
    };

    if store.save(state.memory.iter()) {
      self.stats.record_save();
      state.dirty = false;
      true
    } else {
      warn!("Disk persistence disabled for the rest of this session");
      state.storage = None;
      false
    }
  }
}
