//! Thread-safe cache statistics with atomic counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters recorded by the coordinator at each decision point.
///
/// All counters only ever increase. Relaxed ordering is enough; the values
/// are for reporting, not synchronization.
#[derive(Debug, Default)]
pub struct CacheStatistics {
  total_reads: AtomicU64,
  memory_hits: AtomicU64,
  degraded_hits: AtomicU64,
  api_calls: AtomicU64,
  evictions: AtomicU64,
  invalidations: AtomicU64,
  cache_saves: AtomicU64,
}

impl CacheStatistics {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn record_read(&self) {
    self.total_reads.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_memory_hit(&self) {
    self.memory_hits.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_degraded_hit(&self) {
    self.degraded_hits.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_api_call(&self) {
    self.api_calls.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_eviction(&self) {
    self.evictions.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_invalidations(&self, count: u64) {
    self.invalidations.fetch_add(count, Ordering::Relaxed);
  }

  pub(crate) fn record_save(&self) {
    self.cache_saves.fetch_add(1, Ordering::Relaxed);
  }

  pub fn total_reads(&self) -> u64 {
    self.total_reads.load(Ordering::Relaxed)
  }

  pub fn memory_hits(&self) -> u64 {
    self.memory_hits.load(Ordering::Relaxed)
  }

  /// Reads answered from memory because the freshness check failed transiently.
  pub fn degraded_hits(&self) -> u64 {
    self.degraded_hits.load(Ordering::Relaxed)
  }

  pub fn api_calls(&self) -> u64 {
    self.api_calls.load(Ordering::Relaxed)
  }

  pub fn evictions(&self) -> u64 {
    self.evictions.load(Ordering::Relaxed)
  }

  pub fn invalidations(&self) -> u64 {
    self.invalidations.load(Ordering::Relaxed)
  }

  pub fn cache_saves(&self) -> u64 {
    self.cache_saves.load(Ordering::Relaxed)
  }

  /// `memory_hits / total_reads`, or 0 before the first read.
  pub fn hit_rate(&self) -> f64 {
    let total = self.total_reads();
    if total == 0 {
      0.0
    } else {
      self.memory_hits() as f64 / total as f64
    }
  }

  /// Every memory hit is a fetch that did not happen.
  pub fn api_calls_saved(&self) -> u64 {
    self.memory_hits()
  }

  pub fn snapshot(
    &self,
    current_size: usize,
    max_size: usize,
    enabled: bool,
  ) -> StatisticsSnapshot {
    StatisticsSnapshot {
      enabled,
      total_reads: self.total_reads(),
      memory_hits: self.memory_hits(),
      degraded_hits: self.degraded_hits(),
      api_calls: self.api_calls(),
      hit_rate: self.hit_rate(),
      api_calls_saved: self.api_calls_saved(),
      evictions: self.evictions(),
      invalidations: self.invalidations(),
      cache_saves: self.cache_saves(),
      current_size,
      max_size,
    }
  }
}

/// Point-in-time view of the statistics, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
  pub enabled: bool,
  pub total_reads: u64,
  pub memory_hits: u64,
  pub degraded_hits: u64,
  pub api_calls: u64,
  pub hit_rate: f64,
  pub api_calls_saved: u64,
  pub evictions: u64,
  pub invalidations: u64,
  pub cache_saves: u64,
  pub current_size: usize,
  pub max_size: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hit_rate_zero_without_reads() {
    let stats = CacheStatistics::new();
    assert_eq!(stats.hit_rate(), 0.0);
  }

  #[test]
  fn test_hit_rate_and_savings() {
    let stats = CacheStatistics::new();
    for _ in 0..4 {
      stats.record_read();
    }
    stats.record_memory_hit();
    stats.record_memory_hit();
    stats.record_memory_hit();
    stats.record_api_call();

    assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    assert_eq!(stats.api_calls_saved(), 3);
  }

  #[test]
  fn test_snapshot_carries_sizes() {
    let stats = CacheStatistics::new();
    stats.record_read();
    stats.record_api_call();
    stats.record_invalidations(3);

    let snap = stats.snapshot(1, 10, true);
    assert_eq!(snap.total_reads, 1);
    assert_eq!(snap.api_calls, 1);
    assert_eq!(snap.invalidations, 3);
    assert_eq!(snap.current_size, 1);
    assert_eq!(snap.max_size, 10);
    assert!(snap.enabled);
  }
}
